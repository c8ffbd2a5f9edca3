use tracing::{info, warn};

use stash_types::{AssetId, AssetRecord, BackendKey};

use crate::error::{StashError, StashResult};
use crate::store::AssetStore;

impl AssetStore {
    /// Delete the asset `id`.
    ///
    /// The catalog row goes first. A failure to remove the backend object
    /// afterwards is logged and leaves an orphan; the delete still succeeds.
    pub async fn delete(&self, id: &str) -> StashResult<AssetRecord> {
        let id = AssetId::parse(id)?;
        let record = self.record(&id).await?;

        let removed = self
            .catalog
            .delete(&id)
            .await
            .map_err(StashError::CatalogWriteFailed)?;
        if !removed {
            return Err(StashError::NotFound(id.to_string()));
        }

        match self.placement.key_for(&record) {
            Ok(key) => self.remove_object(&key).await,
            Err(e) => warn!(id = %id, error = %e, "record had no valid key; nothing to remove"),
        }
        info!(id = %id, digest = %record.content_digest.short_hex(), "deleted asset");
        Ok(record)
    }

    async fn remove_object(&self, key: &BackendKey) {
        match self.backend.remove(key).await {
            Ok(true) => {}
            Ok(false) => warn!(key = %key, "backend object already gone"),
            Err(e) => warn!(key = %key, error = %e, "failed to remove backend object; left as orphan"),
        }
        if let Err(e) = self.cache.invalidate(key).await {
            warn!(key = %key, error = %e, "failed to drop cached copy");
        }
        self.placement.release(key);
    }
}
