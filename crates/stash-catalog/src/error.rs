use stash_types::ContentDigest;

/// Errors from catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Another record already holds this content digest.
    #[error("content digest already cataloged: {digest}")]
    Conflict { digest: ContentDigest },

    /// A unique column other than the digest was violated.
    #[error("duplicate {column}: {value}")]
    Duplicate { column: &'static str, value: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded into a record.
    #[error("corrupt catalog row: {0}")]
    Corrupt(String),
}

/// Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;
