use std::io;

/// Errors from hashing an incoming stream.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// The stream exceeded the configured size bound.
    #[error("payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },

    /// The source stream failed.
    #[error("failed to read payload: {0}")]
    Read(#[source] io::Error),

    /// The temporary spool file could not be created or written.
    #[error("failed to spool payload: {0}")]
    Spool(#[source] io::Error),
}

/// Result alias for hashing operations.
pub type HashResult<T> = Result<T, HashError>;
