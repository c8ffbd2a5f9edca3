use tracing::debug;

use stash_backend::BackendError;
use stash_cache::CacheHandle;
use stash_types::{AssetId, AssetRecord};

use crate::error::{StashError, StashResult};
use crate::store::AssetStore;

/// An opened asset, ready to stream.
#[derive(Debug)]
pub struct Download {
    /// Bytes of the object, read through the local cache.
    pub reader: CacheHandle,
    /// Exact length of `reader`.
    pub size: u64,
    /// Media type recorded at ingest.
    pub media_type: String,
    /// Name the asset was requested under.
    pub file_name: String,
}

impl AssetStore {
    /// Open the asset named `requested_name` (`<id>` or `<id>.<ext>`).
    ///
    /// The id is validated before any lookup.
    pub async fn retrieve(&self, requested_name: &str) -> StashResult<Download> {
        let id = AssetId::from_file_name(requested_name)?;
        let record = self.record(&id).await?;
        let key = self
            .placement
            .key_for(&record)
            .map_err(|e| StashError::BackendReadFailed(BackendError::InvalidKey(e)))?;

        let reader = self.cache.open(&key).await?;
        debug!(id = %id, key = %key, size = reader.size(), "opened asset");
        Ok(Download {
            size: reader.size(),
            reader,
            media_type: record.media_type,
            file_name: requested_name.to_string(),
        })
    }

    /// Look up the record for `id`.
    pub async fn record(&self, id: &AssetId) -> StashResult<AssetRecord> {
        self.catalog
            .get(id)
            .await
            .map_err(StashError::CatalogReadFailed)?
            .ok_or_else(|| StashError::NotFound(id.to_string()))
    }
}
