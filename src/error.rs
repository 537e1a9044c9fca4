use std::io;
use thiserror::Error;

/// Error kinds the core distinguishes (spec §7).
#[derive(Error, Debug)]
pub enum BisyncError {
    /// The persisted index could not be parsed. Fatal for that replica;
    /// the run aborts before any file mutation.
    #[error("corrupt index for replica '{replica}': {source}")]
    CorruptIndex {
        replica: String,
        #[source]
        source: serde_json::Error,
    },

    /// A `Source` operation failed. The offending transfer aborts without
    /// calling `merge_versions`; the pair continues with the remaining
    /// paths.
    #[error("source I/O error on replica '{replica}' at '{path}': {source}")]
    SourceIoError {
        replica: String,
        path: String,
        #[source]
        source: io::Error,
    },

    /// An internal consistency check failed (e.g. an empty history was
    /// encountered). Fatal; must not overwrite persisted state.
    #[error("invariant violation for replica '{replica}' at '{path}': {message}")]
    InvariantViolation {
        replica: String,
        path: String,
        message: String,
    },

    /// Catch-all for ad hoc failures that don't fit the kinds above.
    #[error("{0}")]
    Error(String),
}

impl BisyncError {
    pub fn invariant(replica: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        BisyncError::InvariantViolation {
            replica: replica.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type BisyncResult<T> = Result<T, BisyncError>;
