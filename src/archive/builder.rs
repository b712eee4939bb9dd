use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use tracing::{debug, info};

use crate::archive::writer::{EntrySource, StorageMethod, ZipWriter};
use crate::errors::{Error, Result};
use crate::scanner::ScanResult;

/// A scan result whose entries are relocated under a virtual-path prefix
/// inside the archive.
#[derive(Debug, Clone)]
pub struct RelocatedFileSet {
    /// The selected entries.
    pub scan: ScanResult,
    /// Prefix prepended to every virtual path drawn from this fileset. A
    /// trailing separator is appended during the build if missing.
    pub prefix: String,
}

/// Assembles scan results into one archive.
///
/// The builder owns the set of directory virtual paths already written, so
/// directory entries are emitted exactly once per build no matter how many
/// filesets contribute them. The set lives and dies with the builder value:
/// one builder, one build, no state leaking into the next invocation.
pub struct ArchiveBuilder {
    method: StorageMethod,
    added_dirs: HashSet<String>,
}

impl ArchiveBuilder {
    /// Creates a builder that stores file entries with `method`.
    #[must_use]
    pub fn new(method: StorageMethod) -> Self {
        Self {
            method,
            added_dirs: HashSet::new(),
        }
    }

    /// Writes the archive: relocated filesets first, then plain scan
    /// results, each group fully emitted in caller order. The destination
    /// is overwritten, never appended to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on any read or write failure. A partially
    /// written destination is deleted best-effort first; if that deletion
    /// fails too, a note is appended to the error context while the
    /// original cause is kept.
    pub fn build(
        mut self,
        relocated: &[RelocatedFileSet],
        plain: &[ScanResult],
        destination: &Path,
    ) -> Result<()> {
        info!(destination = %destination.display(), "building zip archive");
        self.write_archive(relocated, plain, destination)
            .map_err(|err| cleanup_destination(destination, err))
    }

    fn write_archive(
        &mut self,
        relocated: &[RelocatedFileSet],
        plain: &[ScanResult],
        destination: &Path,
    ) -> Result<()> {
        let file = File::create(destination).map_err(|err| {
            Error::io(
                format!("failed to create archive {}", destination.display()),
                err,
            )
        })?;
        let mut writer = ZipWriter::new(BufWriter::new(file));

        for fileset in relocated {
            let prefix = normalize_prefix(&fileset.prefix);
            self.add_fileset(&mut writer, &fileset.scan, &prefix)?;
        }
        for scan in plain {
            self.add_fileset(&mut writer, scan, "")?;
        }

        writer.finish()?;
        Ok(())
    }

    /// Emits one fileset: the relocation prefix chain, then matched
    /// directories, then matched files, each preceded by any missing
    /// ancestor directories.
    fn add_fileset(
        &mut self,
        writer: &mut ZipWriter<BufWriter<File>>,
        scan: &ScanResult,
        prefix: &str,
    ) -> Result<()> {
        if !prefix.is_empty() {
            // The prefix itself is an entry (with its own ancestors); it has
            // no on-disk counterpart, so its timestamp is the DOS epoch.
            self.add_parent_dirs(writer, None, prefix, "")?;
        }

        for dir in scan.included_dirs() {
            if dir.is_empty() {
                // The base directory maps onto the prefix (or the archive
                // root) and never produces an entry of its own.
                continue;
            }
            let name = format!("{dir}/");
            self.add_parent_dirs(writer, Some(scan), &name, prefix)?;
        }

        for file in scan.included_files() {
            self.add_parent_dirs(writer, Some(scan), file, prefix)?;
            self.add_file_entry(writer, scan, file, prefix)?;
        }
        Ok(())
    }

    /// Ensures every ancestor directory of `entry` exists in the archive,
    /// walking backward through the separators until hitting one already
    /// emitted. When `entry` itself ends with a separator it is emitted
    /// too.
    fn add_parent_dirs(
        &mut self,
        writer: &mut ZipWriter<BufWriter<File>>,
        scan: Option<&ScanResult>,
        entry: &str,
        prefix: &str,
    ) -> Result<()> {
        let mut outstanding = Vec::new();
        let mut end = entry.len();
        while let Some(pos) = entry[..end].rfind('/') {
            let dir = &entry[..=pos];
            if self.added_dirs.contains(&format!("{prefix}{dir}")) {
                break;
            }
            outstanding.push(dir);
            end = pos;
        }

        while let Some(dir) = outstanding.pop() {
            self.add_dir_entry(writer, scan, dir, prefix)?;
        }
        Ok(())
    }

    fn add_dir_entry(
        &mut self,
        writer: &mut ZipWriter<BufWriter<File>>,
        scan: Option<&ScanResult>,
        dir: &str,
        prefix: &str,
    ) -> Result<()> {
        let vpath = format!("{prefix}{dir}");
        if !self.added_dirs.insert(vpath.clone()) {
            return Ok(());
        }
        let mtime = scan
            .map(|s| s.resolve(dir))
            .and_then(|path| fs::metadata(path).ok())
            .and_then(|meta| meta.modified().ok());
        debug!(entry = %vpath, "adding directory entry");
        writer.add_directory(&vpath, mtime)
    }

    fn add_file_entry(
        &mut self,
        writer: &mut ZipWriter<BufWriter<File>>,
        scan: &ScanResult,
        file: &str,
        prefix: &str,
    ) -> Result<()> {
        let source_path = scan.resolve(file);
        let mut source = File::open(&source_path).map_err(|err| {
            Error::io(format!("failed to open {}", source_path.display()), err)
        })?;
        let mtime = source.metadata().ok().and_then(|meta| meta.modified().ok());
        let vpath = format!("{prefix}{file}");
        debug!(entry = %vpath, "adding file entry");
        writer.add_file(
            &vpath,
            EntrySource::Rewindable(&mut source),
            mtime,
            self.method,
        )
    }
}

/// Appends a trailing separator to a non-empty prefix that lacks one.
fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    }
}

/// Best-effort removal of a partially written destination. The original
/// failure always survives; a failed deletion only adds a note.
fn cleanup_destination(destination: &Path, err: Error) -> Error {
    if fs::remove_file(destination).is_err() && destination.exists() {
        if let Error::Io { context, source } = err {
            return Error::Io {
                context: format!(
                    "{context} (and the partially written archive {} could not be deleted)",
                    destination.display()
                ),
                source,
            };
        }
        return err;
    }
    err
}
