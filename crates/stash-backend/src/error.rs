use stash_types::{BackendKey, TypeError};

/// Errors from backend operations.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No object is stored under the key.
    #[error("object not found: {0}")]
    NotFound(BackendKey),

    /// The stream handed to `put` did not match its declared size.
    #[error("size mismatch for {key}: declared {expected} bytes, received {actual}")]
    SizeMismatch {
        key: BackendKey,
        expected: u64,
        actual: u64,
    },

    /// A key read back from the backend is not a valid key.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] TypeError),

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Returns `true` for [`BackendError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;
