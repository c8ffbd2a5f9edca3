use stash_backend::BackendError;
use stash_types::BackendKey;

/// Errors from the cache tier.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Neither the mirror nor the backend holds the key.
    #[error("object not found: {0}")]
    NotFound(BackendKey),

    /// Local disk failure in the mirror.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend failed while fetching a missing entry.
    #[error("backend error: {0}")]
    Backend(#[source] BackendError),
}

impl From<BackendError> for CacheError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(key) => Self::NotFound(key),
            other => Self::Backend(other),
        }
    }
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
