//! Deduplicating ingest.
//!
//! The catalog's unique digest is the only arbiter of concurrent uploads of
//! the same content. The pre-check below is an optimisation; losing the
//! insert race degrades to a dedup result.

use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use stash_backend::BackendError;
use stash_catalog::CatalogError;
use stash_hasher::Spool;
use stash_types::{AssetId, AssetRecord, BackendKey, TypeError};

use crate::error::{StashError, StashResult};
use crate::placement::{content_key, Placement};
use crate::store::AssetStore;

const INSERT_ATTEMPTS: usize = 3;

/// Result of [`AssetStore::ingest`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestOutcome {
    pub record: AssetRecord,
    /// `false` when the content was already stored.
    pub is_new_upload: bool,
}

impl AssetStore {
    /// Store the bytes of `reader`, or return the record that already holds
    /// the same content.
    pub async fn ingest<R>(&self, reader: R) -> StashResult<IngestOutcome>
    where
        R: AsyncRead + Unpin + Send,
    {
        let hashed = self.hasher.hash_stream(reader).await?;
        let digest = hashed.digest;

        if let Some(existing) = self
            .catalog
            .get_by_digest(&digest)
            .await
            .map_err(StashError::CatalogReadFailed)?
        {
            info!(id = %existing.id, digest = %digest.short_hex(), "dedup hit");
            return Ok(IngestOutcome {
                record: existing,
                is_new_upload: false,
            });
        }

        // Counter placement keys depend on the id, so it is allocated before
        // the write; content placement assigns it at commit.
        let (early_id, key, storage_key) = match &self.placement {
            Placement::ContentAddressed => (None, content_key(&digest).map_err(invalid_key)?, None),
            Placement::Counter(counter) => {
                let id = AssetId::new();
                let key = counter.place(&id).map_err(invalid_key)?;
                (Some(id), key.clone(), Some(key))
            }
        };

        if let Err(e) = self.write_object(&key, &hashed.spool).await {
            self.placement.release(&key);
            return Err(e);
        }

        let id = early_id.unwrap_or_else(AssetId::new);
        let record = AssetRecord::new(id, digest, hashed.size, &hashed.media_type, storage_key);
        self.commit(record, &key, &hashed.spool).await
    }

    /// Replay the spooled bytes into the backend under `key`.
    async fn write_object(&self, key: &BackendKey, spool: &Spool) -> StashResult<()> {
        let file = spool.open().await.map_err(StashError::SpoolError)?;
        if let Err(e) = self.backend.put(key, Box::new(file), spool.len()).await {
            warn!(key = %key, error = %e, "backend write failed");
            return Err(StashError::BackendWriteFailed(e));
        }
        debug!(key = %key, size = spool.len(), "wrote backend object");
        Ok(())
    }

    async fn commit(
        &self,
        record: AssetRecord,
        key: &BackendKey,
        spool: &Spool,
    ) -> StashResult<IngestOutcome> {
        for _ in 0..INSERT_ATTEMPTS {
            match self.catalog.insert(&record).await {
                Ok(()) => {
                    info!(
                        id = %record.id,
                        size = record.size,
                        media_type = %record.media_type,
                        key = %key,
                        "stored new asset"
                    );
                    return Ok(IngestOutcome {
                        record,
                        is_new_upload: true,
                    });
                }
                Err(CatalogError::Conflict { digest }) => {
                    let winner = self
                        .catalog
                        .get_by_digest(&digest)
                        .await
                        .map_err(StashError::CatalogReadFailed)?;
                    let Some(winner) = winner else {
                        // The winner was deleted again, and its delete may have
                        // removed a shared key. Rewrite before retrying.
                        debug!(key = %key, digest = %digest.short_hex(), "dedup winner vanished");
                        if let Err(e) = self.write_object(key, spool).await {
                            self.placement.release(key);
                            return Err(e);
                        }
                        continue;
                    };
                    info!(id = %winner.id, digest = %digest.short_hex(), "lost dedup race");
                    self.discard_loser(&winner, key).await;
                    return Ok(IngestOutcome {
                        record: winner,
                        is_new_upload: false,
                    });
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "catalog insert failed; backend object orphaned");
                    self.placement.release(key);
                    return Err(StashError::CatalogWriteFailed(e));
                }
            }
        }
        warn!(key = %key, "digest kept conflicting; backend object orphaned");
        self.placement.release(key);
        Err(StashError::CatalogWriteFailed(CatalogError::Conflict {
            digest: record.content_digest,
        }))
    }

    /// Remove a losing writer's object when it is not the winner's object.
    async fn discard_loser(&self, winner: &AssetRecord, key: &BackendKey) {
        match self.placement.key_for(winner) {
            Ok(winner_key) if &winner_key == key => return,
            _ => {}
        }
        self.placement.release(key);
        if let Err(e) = self.backend.remove(key).await {
            warn!(key = %key, error = %e, "failed to remove losing upload; left for orphan sweep");
        }
    }
}

fn invalid_key(err: TypeError) -> StashError {
    StashError::BackendWriteFailed(BackendError::InvalidKey(err))
}
