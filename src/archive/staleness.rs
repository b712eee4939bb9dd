use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{Error, Result};
use crate::scanner::ScanResult;

/// What to do when a build selects no files at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyBehavior {
    /// Raise a build failure; nothing is written.
    Fail,
    /// Leave the destination untouched and report up to date.
    #[default]
    Skip,
    /// Write a minimal valid empty archive unless the destination already
    /// exists.
    Create,
}

/// The complete 22-byte empty archive: an end-of-central-directory record
/// with no entries, per the PKZIP specification.
const EMPTY_ARCHIVE: [u8; 22] = [
    0x50, 0x4b, 0x05, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Decides whether the destination archive needs rebuilding.
///
/// The union of included files across all scan results drives the decision.
/// An empty union is resolved by `when_empty` (and may itself write an empty
/// archive under [`EmptyBehavior::Create`]). A non-empty union makes the
/// destination stale when it is absent or when any source file's
/// modification time is strictly newer than the destination's.
///
/// # Errors
///
/// Returns [`Error::Build`] for an empty union under
/// [`EmptyBehavior::Fail`], and [`Error::Io`] if modification times cannot
/// be read or the empty archive cannot be written.
pub fn is_up_to_date(
    scans: &[ScanResult],
    destination: &Path,
    when_empty: EmptyBehavior,
) -> Result<bool> {
    let sources: Vec<PathBuf> = scans
        .iter()
        .flat_map(|scan| scan.included_files().iter().map(|rel| scan.resolve(rel)))
        .collect();

    if sources.is_empty() {
        return match when_empty {
            EmptyBehavior::Skip => {
                warn!(
                    destination = %destination.display(),
                    "skipping archive: no files were included"
                );
                Ok(true)
            }
            EmptyBehavior::Fail => Err(Error::Build(format!(
                "cannot create archive {}: no files were included",
                destination.display()
            ))),
            EmptyBehavior::Create => {
                if destination.exists() {
                    return Ok(true);
                }
                info!(destination = %destination.display(), "creating empty archive");
                write_empty_archive(destination)?;
                Ok(true)
            }
        };
    }

    if !destination.exists() {
        return Ok(false);
    }
    let destination_mtime = modified(destination)?;
    for source in &sources {
        if modified(source)? > destination_mtime {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Writes the byte-exact 22-byte empty archive.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be written.
pub fn write_empty_archive(destination: &Path) -> Result<()> {
    fs::write(destination, EMPTY_ARCHIVE).map_err(|err| {
        Error::io(
            format!("failed to create empty archive {}", destination.display()),
            err,
        )
    })
}

fn modified(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|err| {
            Error::io(
                format!("failed to read modification time of {}", path.display()),
                err,
            )
        })
}
