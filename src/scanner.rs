use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use rayon::prelude::*;
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::{Error, Result};
use crate::matcher::{PatternSet, Selection};

/// Exclude patterns applied to every scan unless switched off, covering
/// editor droppings and version-control metadata.
pub static DEFAULT_EXCLUDES: &[&str] = &[
    "**/*~",
    "**/#*#",
    "**/.#*",
    "**/%*%",
    "**/CVS",
    "**/CVS/**",
    "**/.cvsignore",
    "**/SCCS",
    "**/SCCS/**",
    "**/vssver.scc",
    "**/.git",
    "**/.git/**",
    "**/.gitignore",
    "**/.svn",
    "**/.svn/**",
    "**/.DS_Store",
];

static COMPILED_DEFAULT_EXCLUDES: Lazy<PatternSet> = Lazy::new(|| {
    PatternSet::new::<&str>(&[], DEFAULT_EXCLUDES)
        .expect("built-in default exclude patterns are valid")
});

/// Scan-wide behavior flags.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Whether pattern matching distinguishes case. Applies to the whole
    /// scan, not to individual patterns.
    pub case_sensitive: bool,
    /// Whether symbolic links are traversed. When off, a symlinked entry is
    /// recorded in the excluded bucket and never entered.
    pub follow_symlinks: bool,
    /// Whether [`DEFAULT_EXCLUDES`] are appended to the exclude list.
    pub use_default_excludes: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            follow_symlinks: true,
            use_default_excludes: true,
        }
    }
}

/// The outcome of one tree scan: every discovered entry, classified.
///
/// All buckets hold distinct relative forward-slash paths; the base
/// directory itself participates as the empty string. Buckets are sets:
/// duplicate matches from overlapping patterns collapse, and membership is
/// independent of pattern declaration order.
#[derive(Debug, Clone)]
pub struct ScanResult {
    base_dir: PathBuf,
    included_files: BTreeSet<String>,
    included_dirs: BTreeSet<String>,
    excluded_files: BTreeSet<String>,
    excluded_dirs: BTreeSet<String>,
    not_included: BTreeSet<String>,
}

impl ScanResult {
    /// The directory the scan was rooted at.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Files selected by the pattern set.
    #[must_use]
    pub fn included_files(&self) -> &BTreeSet<String> {
        &self.included_files
    }

    /// Directories selected by the pattern set.
    #[must_use]
    pub fn included_dirs(&self) -> &BTreeSet<String> {
        &self.included_dirs
    }

    /// Files matched by an include pattern but vetoed by an exclude.
    #[must_use]
    pub fn excluded_files(&self) -> &BTreeSet<String> {
        &self.excluded_files
    }

    /// Directories matched by an include pattern but vetoed by an exclude,
    /// plus symlinked directories under `follow_symlinks = false`.
    #[must_use]
    pub fn excluded_dirs(&self) -> &BTreeSet<String> {
        &self.excluded_dirs
    }

    /// Entries no include pattern matched.
    #[must_use]
    pub fn not_included(&self) -> &BTreeSet<String> {
        &self.not_included
    }

    /// Resolves a relative forward-slash path against the base directory.
    #[must_use]
    pub fn resolve(&self, relative: &str) -> PathBuf {
        let mut path = self.base_dir.clone();
        for part in relative.split('/').filter(|s| !s.is_empty()) {
            path.push(part);
        }
        path
    }
}

/// Walks a directory tree and classifies every entry against an
/// include/exclude pattern set.
///
/// Directories are always descended into regardless of their own
/// classification, so a non-matching ancestor never hides a matching
/// descendant. The single exception is a directory reached through a
/// symbolic link while `follow_symlinks` is off: it is recorded but not
/// entered.
#[derive(Debug)]
pub struct TreeScanner {
    base_dir: PathBuf,
    patterns: PatternSet,
    options: ScanOptions,
}

impl TreeScanner {
    /// Compiles the pattern lists and binds them to a base directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`] if any pattern fails to compile.
    pub fn new<S: AsRef<str>>(
        base_dir: impl Into<PathBuf>,
        includes: &[S],
        excludes: &[S],
        options: ScanOptions,
    ) -> Result<Self> {
        Ok(Self {
            base_dir: base_dir.into(),
            patterns: PatternSet::new(includes, excludes)?,
            options,
        })
    }

    /// Runs the scan, producing a fresh [`ScanResult`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the base directory does not exist
    /// or is not a directory (checked before any traversal), and
    /// [`Error::Io`] if the walk itself fails.
    pub fn scan(&self) -> Result<ScanResult> {
        let base = &self.base_dir;
        let meta = fs::metadata(base).map_err(|_| {
            Error::Configuration(format!("base directory {} does not exist", base.display()))
        })?;
        if !meta.is_dir() {
            return Err(Error::Configuration(format!(
                "{} is not a directory",
                base.display()
            )));
        }

        debug!(base = %base.display(), "scanning directory tree");

        let mut result = ScanResult {
            base_dir: base.clone(),
            included_files: BTreeSet::new(),
            included_dirs: BTreeSet::new(),
            excluded_files: BTreeSet::new(),
            excluded_dirs: BTreeSet::new(),
            not_included: BTreeSet::new(),
        };

        let walker = WalkDir::new(base).follow_links(self.options.follow_symlinks);
        for entry in walker {
            let entry = entry.map_err(|err| walk_error(base, err))?;
            let relative = relative_slash_path(base, entry.path());

            if !self.options.follow_symlinks && entry.path_is_symlink() {
                // Recorded but never entered: the link target's kind decides
                // the bucket, a dangling link counts as a file.
                let is_dir = fs::metadata(entry.path()).is_ok_and(|m| m.is_dir());
                if is_dir {
                    result.excluded_dirs.insert(relative);
                } else {
                    result.excluded_files.insert(relative);
                }
                continue;
            }

            let is_dir = entry.file_type().is_dir();
            let bucket = match self.classify(&relative) {
                Selection::Included => {
                    if is_dir {
                        &mut result.included_dirs
                    } else {
                        &mut result.included_files
                    }
                }
                Selection::Excluded => {
                    if is_dir {
                        &mut result.excluded_dirs
                    } else {
                        &mut result.excluded_files
                    }
                }
                Selection::NotIncluded => &mut result.not_included,
            };
            bucket.insert(relative);
        }

        debug!(
            files = result.included_files.len(),
            dirs = result.included_dirs.len(),
            "scan complete"
        );
        Ok(result)
    }

    fn classify(&self, relative: &str) -> Selection {
        let selection = self.patterns.selects(relative, self.options.case_sensitive);
        if selection == Selection::Included
            && self.options.use_default_excludes
            && COMPILED_DEFAULT_EXCLUDES.is_excluded(relative, self.options.case_sensitive)
        {
            return Selection::Excluded;
        }
        selection
    }
}

/// Scans several independent filesets, fanning the work out over the rayon
/// pool. Results come back in caller order; nothing is shared between scans,
/// so parallelism cannot change any individual outcome.
///
/// # Errors
///
/// Returns the first scan failure in caller order.
pub fn scan_many(scanners: &[TreeScanner]) -> Result<Vec<ScanResult>> {
    scanners
        .par_iter()
        .map(TreeScanner::scan)
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

fn relative_slash_path(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_error(base: &Path, err: walkdir::Error) -> Error {
    let context = match err.path() {
        Some(path) => format!("failed to read {}", path.display()),
        None => format!("failed to scan {}", base.display()),
    };
    match err.into_io_error() {
        Some(io) => Error::io(context, io),
        None => Error::io(context, std::io::Error::other("filesystem loop detected")),
    }
}
