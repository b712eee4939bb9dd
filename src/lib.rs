#![warn(missing_docs)]
// Allow pedantic strict lints that create false positives in this codebase
#![allow(clippy::arithmetic_side_effects)] // Offset counters and size sums cannot overflow
#![allow(clippy::indexing_slicing)] // Bounds checked by logic

//! # Zipforge - File Selection and Archive Assembly
//!
//! Zipforge is the file-selection and archive-assembly core of a build and
//! packaging pipeline: glob-pattern filesets decide which files participate,
//! and a PKZIP-compatible writer packages them deterministically.
//!
//! ## Features
//!
//! - **Glob filesets**: `?`, `*` and `**` patterns with scan-wide
//!   case-sensitivity and symlink policy; excludes always dominate
//! - **Deterministic archives**: parent directories precede their entries,
//!   each directory appears exactly once, output order is reproducible
//! - **Rebuild avoidance**: modification-time staleness checks with
//!   configurable empty-input behavior, including the 22-byte empty
//!   archive (a bare end-of-central-directory record)
//! - **Relocation**: any fileset can be re-rooted under a virtual-path
//!   prefix inside the archive
//! - **Store or deflate**: raw copies or deflate compression per build
//!
//! ## Architecture
//!
//! The codebase is organized into several key modules:
//!
//! - [`matcher`]: glob pattern compilation and matching
//! - [`scanner`]: directory traversal and entry classification
//! - [`archive`]: staleness checking, container writing, and assembly
//! - [`config`]: TOML configuration surface tying it all together
//! - [`errors`]: the failure taxonomy shared by every engine
//!
//! ## Example Usage
//!
//! ```no_run
//! use zipforge::{ArchiveConfig, FilesetConfig};
//!
//! # fn main() -> zipforge::Result<()> {
//! let mut config = ArchiveConfig::new("dist/docs.zip");
//! let mut fileset = FilesetConfig::for_dir("docs");
//! fileset.includes = vec!["**/*.md".to_string()];
//! fileset.excludes = vec!["drafts/**".to_string()];
//! config.filesets.push(fileset);
//!
//! // Scans, checks staleness, and writes the archive if needed.
//! let written = config.execute()?;
//! # let _ = written;
//! # Ok(())
//! # }
//! ```

/// Archive assembly: staleness checking, PKZIP writing, entry sequencing.
pub mod archive;

/// TOML configuration surface for archive builds.
pub mod config;

/// The failure taxonomy shared across the crate.
pub mod errors;

/// Glob pattern compilation and matching.
pub mod matcher;

/// Directory traversal and pattern-based classification.
pub mod scanner;

pub use archive::{
    ArchiveBuilder, EmptyBehavior, EntrySource, RelocatedFileSet, RewindableRead, StorageMethod,
    ZipWriter, is_up_to_date, write_empty_archive,
};
pub use config::{ArchiveConfig, FilesetConfig};
pub use errors::{Error, Result};
pub use matcher::{PatternSet, Selection, TreePattern};
pub use scanner::{DEFAULT_EXCLUDES, ScanOptions, ScanResult, TreeScanner, scan_many};

/// Current version of the zipforge crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
