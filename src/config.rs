use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::{ArchiveBuilder, EmptyBehavior, RelocatedFileSet, StorageMethod, is_up_to_date};
use crate::errors::{Error, Result};
use crate::scanner::{ScanOptions, ScanResult, TreeScanner, scan_many};

/// One fileset: a base directory plus the patterns and flags selecting its
/// contents, and an optional relocation prefix for the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesetConfig {
    /// Base directory to scan.
    pub dir: PathBuf,

    /// Virtual-path prefix applied to every entry from this fileset.
    #[serde(default)]
    pub prefix: String,

    /// Include patterns; empty means include everything.
    #[serde(default)]
    pub includes: Vec<String>,

    /// Exclude patterns; an exclude match always wins.
    #[serde(default)]
    pub excludes: Vec<String>,

    #[serde(default = "default_true")]
    pub case_sensitive: bool,

    #[serde(default = "default_true")]
    pub follow_symlinks: bool,

    /// Whether the built-in default excludes apply.
    #[serde(default = "default_true")]
    pub default_excludes: bool,
}

impl FilesetConfig {
    /// A fileset selecting everything under `dir` with default flags.
    pub fn for_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: String::new(),
            includes: Vec::new(),
            excludes: Vec::new(),
            case_sensitive: true,
            follow_symlinks: true,
            default_excludes: true,
        }
    }

    fn scanner(&self) -> Result<TreeScanner> {
        let options = ScanOptions {
            case_sensitive: self.case_sensitive,
            follow_symlinks: self.follow_symlinks,
            use_default_excludes: self.default_excludes,
        };
        TreeScanner::new(self.dir.clone(), &self.includes, &self.excludes, options)
    }
}

/// Everything one archive build consumes: destination, storage method,
/// empty-input policy, and the filesets feeding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Archive file to produce, fully overwritten on each build.
    pub destination: PathBuf,

    /// Storage method for file entries.
    #[serde(default)]
    pub method: StorageMethod,

    /// What to do when no files match.
    #[serde(default)]
    pub when_empty: EmptyBehavior,

    /// Filesets contributing entries, in archive order.
    #[serde(default)]
    pub filesets: Vec<FilesetConfig>,
}

impl ArchiveConfig {
    /// An archive configuration with no filesets yet.
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            method: StorageMethod::default(),
            when_empty: EmptyBehavior::default(),
            filesets: Vec::new(),
        }
    }

    /// Loads a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Configuration`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read config {}", path.display()), err))?;
        toml::from_str(&content).map_err(|err| {
            Error::Configuration(format!("invalid config {}: {err}", path.display()))
        })
    }

    /// Validates the configuration before any I/O happens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the destination is empty or no
    /// fileset was given.
    pub fn validate(&self) -> Result<()> {
        if self.destination.as_os_str().is_empty() {
            return Err(Error::Configuration(
                "destination must be set".to_string(),
            ));
        }
        if self.filesets.is_empty() {
            return Err(Error::Configuration(
                "at least one fileset must be given".to_string(),
            ));
        }
        Ok(())
    }

    /// Scans every fileset and splits the results into relocated and plain
    /// groups, preserving declaration order within each group.
    ///
    /// # Errors
    ///
    /// Propagates pattern and scan failures.
    pub fn build_plan(&self) -> Result<(Vec<RelocatedFileSet>, Vec<ScanResult>)> {
        let scanners = self
            .filesets
            .iter()
            .map(FilesetConfig::scanner)
            .collect::<Result<Vec<_>>>()?;
        let scans = scan_many(&scanners)?;

        let mut relocated = Vec::new();
        let mut plain = Vec::new();
        for (fileset, scan) in self.filesets.iter().zip(scans) {
            if fileset.prefix.is_empty() {
                plain.push(scan);
            } else {
                relocated.push(RelocatedFileSet {
                    scan,
                    prefix: fileset.prefix.clone(),
                });
            }
        }
        Ok((relocated, plain))
    }

    /// Runs the whole pipeline: validate, scan, staleness check, build.
    /// Returns `true` when an archive was written, `false` when the
    /// destination was already up to date (or the empty-input policy
    /// resolved the build without one).
    ///
    /// # Errors
    ///
    /// Propagates every failure class: configuration, pattern, build and
    /// I/O.
    pub fn execute(&self) -> Result<bool> {
        self.validate()?;
        let (relocated, plain) = self.build_plan()?;

        let all: Vec<ScanResult> = relocated
            .iter()
            .map(|r| r.scan.clone())
            .chain(plain.iter().cloned())
            .collect();
        if is_up_to_date(&all, &self.destination, self.when_empty)? {
            return Ok(false);
        }

        ArchiveBuilder::new(self.method).build(&relocated, &plain, &self.destination)?;
        Ok(true)
    }
}

fn default_true() -> bool {
    true
}
