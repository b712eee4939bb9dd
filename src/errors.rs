use std::io;

/// Failure classes surfaced by the selection and assembly engines.
///
/// All failures are fail-fast: nothing in this crate retries internally, and
/// transient I/O problems are left to the caller to retry at a higher level.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid required input, detected before any I/O side
    /// effect (absent base directory, empty destination, bad enum string).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A glob pattern that cannot be compiled.
    #[error("invalid pattern `{pattern}`: {reason}")]
    Pattern {
        /// The offending pattern as supplied by the caller.
        pattern: String,
        /// Why compilation rejected it.
        reason: String,
    },

    /// The build was asked to proceed with nothing to archive and the
    /// empty-input policy says that is fatal.
    #[error("{0}")]
    Build(String),

    /// A read or write failed while scanning or writing the archive. Wraps
    /// the underlying cause; the context names the operation and path.
    #[error("{context}")]
    Io {
        /// Human-readable description of the failed operation.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Wraps an I/O error with an operation description.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Builds a pattern-compilation error.
    pub fn pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
