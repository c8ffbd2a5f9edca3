use std::io;

use thiserror::Error;

use stash_backend::BackendError;
use stash_cache::CacheError;
use stash_catalog::CatalogError;
use stash_hasher::HashError;
use stash_types::TypeError;

/// Errors surfaced by [`AssetStore`](crate::AssetStore) operations.
///
/// A digest conflict during ingest never appears here; it is resolved into a
/// dedup result.
#[derive(Debug, Error)]
pub enum StashError {
    #[error("payload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },

    #[error("failed to read upload: {0}")]
    ReadError(#[source] io::Error),

    #[error("failed to spool upload: {0}")]
    SpoolError(#[source] io::Error),

    #[error("backend write failed: {0}")]
    BackendWriteFailed(#[source] BackendError),

    #[error("backend read failed: {0}")]
    BackendReadFailed(#[source] BackendError),

    #[error("cache I/O error: {0}")]
    CacheIo(#[source] io::Error),

    #[error("catalog write failed: {0}")]
    CatalogWriteFailed(#[source] CatalogError),

    #[error("catalog read failed: {0}")]
    CatalogReadFailed(#[source] CatalogError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StashError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<HashError> for StashError {
    fn from(err: HashError) -> Self {
        match err {
            HashError::PayloadTooLarge { limit } => Self::PayloadTooLarge { limit },
            HashError::Read(e) => Self::ReadError(e),
            HashError::Spool(e) => Self::SpoolError(e),
        }
    }
}

impl From<CacheError> for StashError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NotFound(key) => Self::NotFound(key.to_string()),
            CacheError::Io(e) => Self::CacheIo(e),
            CacheError::Backend(e) => Self::BackendReadFailed(e),
        }
    }
}

impl From<TypeError> for StashError {
    fn from(err: TypeError) -> Self {
        match err {
            TypeError::InvalidIdentifier(s) => Self::InvalidIdentifier(s),
            other => Self::InvalidIdentifier(other.to_string()),
        }
    }
}

/// Result alias for store operations.
pub type StashResult<T> = Result<T, StashError>;
