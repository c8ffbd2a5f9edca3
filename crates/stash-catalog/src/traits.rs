use async_trait::async_trait;

use stash_types::{AssetId, AssetRecord, BackendKey, ContentDigest};

use crate::error::CatalogResult;

/// Durable store of asset metadata.
///
/// Implementations must guarantee:
/// - `content_digest` is unique. Of two concurrent inserts with the same
///   digest exactly one succeeds; the other gets `CatalogError::Conflict`.
/// - Records are never modified after insert.
/// - `list_page` orders by `created_at` descending, ties by id descending.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Insert a new record.
    async fn insert(&self, record: &AssetRecord) -> CatalogResult<()>;

    async fn get(&self, id: &AssetId) -> CatalogResult<Option<AssetRecord>>;

    async fn get_by_digest(&self, digest: &ContentDigest) -> CatalogResult<Option<AssetRecord>>;

    async fn get_by_storage_key(&self, key: &BackendKey) -> CatalogResult<Option<AssetRecord>>;

    /// Delete a record. Returns `true` if it existed.
    async fn delete(&self, id: &AssetId) -> CatalogResult<bool>;

    /// One page of records, newest first.
    async fn list_page(&self, limit: usize, offset: usize) -> CatalogResult<Vec<AssetRecord>>;

    /// Total number of records.
    async fn count(&self) -> CatalogResult<u64>;

    /// Every stored (counter-placed) backend key.
    async fn all_storage_keys(&self) -> CatalogResult<Vec<BackendKey>>;
}
