/// Archive assembly: scan results in, deterministic entry sequence out.
pub mod builder;

/// Rebuild avoidance and empty-input policy.
pub mod staleness;

/// PKZIP container writer.
pub mod writer;

pub use builder::{ArchiveBuilder, RelocatedFileSet};
pub use staleness::{EmptyBehavior, is_up_to_date, write_empty_archive};
pub use writer::{EntrySource, RewindableRead, StorageMethod, ZipWriter};
