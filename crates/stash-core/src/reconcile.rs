//! Catalog-driven maintenance: shard counter rebuild and orphan removal.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use stash_catalog::Catalog;
use stash_types::{AssetRecord, BackendKey, ContentDigest};

use crate::error::{StashError, StashResult};
use crate::placement::CounterPlacement;
use crate::store::AssetStore;

/// Records fetched per catalog page during a scan.
pub const SCAN_PAGE_SIZE: usize = 500;

/// Catalog pages fetched concurrently during a scan.
pub const SCAN_CONCURRENCY: usize = 4;

/// Reset `counter` from the keys stored in the catalog.
///
/// Returns the number of keys counted.
pub async fn rebuild_counters(
    catalog: &dyn Catalog,
    counter: &CounterPlacement,
) -> StashResult<usize> {
    let keys = catalog
        .all_storage_keys()
        .await
        .map_err(StashError::CatalogReadFailed)?;
    counter.rebuild(keys.iter());
    Ok(keys.len())
}

/// Every record in the catalog, fetched page by page with at most
/// [`SCAN_CONCURRENCY`] pages in flight.
pub async fn scan_catalog(catalog: Arc<dyn Catalog>) -> StashResult<Vec<AssetRecord>> {
    let total = catalog
        .count()
        .await
        .map_err(StashError::CatalogReadFailed)?;
    let pages = usize::try_from(total)
        .unwrap_or(usize::MAX)
        .div_ceil(SCAN_PAGE_SIZE);

    let mut tasks = JoinSet::new();
    let mut next = 0;
    let mut records = Vec::new();
    loop {
        while tasks.len() < SCAN_CONCURRENCY && next < pages {
            let catalog = Arc::clone(&catalog);
            let offset = next * SCAN_PAGE_SIZE;
            tasks.spawn(async move { catalog.list_page(SCAN_PAGE_SIZE, offset).await });
            next += 1;
        }
        let Some(joined) = tasks.join_next().await else {
            break;
        };
        let page = joined
            .map_err(|e| StashError::Internal(format!("catalog scan task failed: {e}")))?
            .map_err(StashError::CatalogReadFailed)?;
        records.extend(page);
    }
    debug!(total, pages, scanned = records.len(), "scanned catalog");
    Ok(records)
}

impl AssetStore {
    /// Remove backend objects that no catalog record refers to.
    ///
    /// Returns the number of objects removed. Each candidate is checked
    /// against the catalog again right before removal. An upload that is
    /// written but not yet cataloged looks like an orphan, so run this while
    /// ingest is quiet.
    pub async fn sweep_orphans(&self) -> StashResult<usize> {
        let stored = self
            .backend
            .list_keys()
            .await
            .map_err(StashError::BackendReadFailed)?;
        let referenced: HashSet<BackendKey> = scan_catalog(Arc::clone(&self.catalog))
            .await?
            .iter()
            .filter_map(|record| self.placement.key_for(record).ok())
            .collect();

        let scanned = stored.len();
        let mut removed = 0;
        for key in stored.into_iter().filter(|k| !referenced.contains(k)) {
            if self.is_referenced(&key).await? {
                continue;
            }
            match self.backend.remove(&key).await {
                Ok(true) => {
                    removed += 1;
                    info!(key = %key, "removed orphaned object");
                    if let Err(e) = self.cache.invalidate(&key).await {
                        warn!(key = %key, error = %e, "failed to drop cached copy");
                    }
                }
                Ok(false) => {}
                Err(e) => warn!(key = %key, error = %e, "failed to remove orphaned object"),
            }
        }
        info!(scanned, removed, "orphan sweep finished");
        Ok(removed)
    }

    async fn is_referenced(&self, key: &BackendKey) -> StashResult<bool> {
        let by_key = self
            .catalog
            .get_by_storage_key(key)
            .await
            .map_err(StashError::CatalogReadFailed)?;
        if by_key.is_some() {
            return Ok(true);
        }

        let name = key.file_name();
        let Ok(digest) = ContentDigest::from_hex(name) else {
            return Ok(false);
        };
        if key.parent() != name.get(..2) {
            return Ok(false);
        }
        let by_digest = self
            .catalog
            .get_by_digest(&digest)
            .await
            .map_err(StashError::CatalogReadFailed)?;
        Ok(by_digest.is_some_and(|record| record.storage_key.is_none()))
    }
}

#[cfg(test)]
mod tests {
    use stash_backend::{Backend, ObjectReader};
    use stash_catalog::InMemoryCatalog;
    use stash_types::{AssetId, MediaType};

    use super::*;
    use crate::placement::{content_key, CounterConfig, CounterPlacement, Placement};
    use crate::testing::{harness, harness_with, TEST_LIMIT};

    fn payload(data: &'static [u8]) -> (ObjectReader, u64) {
        (Box::new(data), data.len() as u64)
    }

    #[tokio::test]
    async fn sweep_removes_only_unreferenced_objects() {
        let h = harness().await;
        let kept = h.store.ingest(&b"kept"[..]).await.unwrap().record;

        let stray_digest = content_key(&ContentDigest::of(b"stray")).unwrap();
        let junk = BackendKey::new("zz/junk").unwrap();
        for key in [&stray_digest, &junk] {
            let (reader, size) = payload(b"garbage");
            h.backend.inner.put(key, reader, size).await.unwrap();
        }

        assert_eq!(h.store.sweep_orphans().await.unwrap(), 2);
        assert_eq!(h.backend.inner.len(), 1);
        assert!(h
            .backend
            .inner
            .exists(&content_key(&kept.content_digest).unwrap())
            .await
            .unwrap());
        assert_eq!(h.store.sweep_orphans().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sweep_keeps_counter_placed_objects() {
        let placement = Placement::Counter(CounterPlacement::new(CounterConfig::default()));
        let h = harness_with(placement, TEST_LIMIT).await;
        let record = h.store.ingest(&b"placed"[..]).await.unwrap().record;

        // Same digest, but this record was stored under a counter key.
        let (reader, size) = payload(b"placed");
        let shadow = content_key(&record.content_digest).unwrap();
        h.backend.inner.put(&shadow, reader, size).await.unwrap();

        assert_eq!(h.store.sweep_orphans().await.unwrap(), 1);
        assert!(h
            .backend
            .inner
            .exists(record.storage_key.as_ref().unwrap())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn scan_reads_every_page() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let total = SCAN_PAGE_SIZE * 2 + 7;
        for i in 0..total {
            let record = AssetRecord::new(
                AssetId::new(),
                ContentDigest::of(&(i as u64).to_le_bytes()),
                8,
                &MediaType::octet_stream(),
                None,
            );
            catalog.insert(&record).await.unwrap();
        }

        let records = scan_catalog(catalog).await.unwrap();
        let unique: HashSet<_> = records.iter().map(|r| r.id).collect();
        assert_eq!(unique.len(), total);
    }

    #[tokio::test]
    async fn rebuild_counts_stored_keys() {
        let catalog = InMemoryCatalog::new();
        let record = AssetRecord::new(
            AssetId::new(),
            ContentDigest::of(b"k"),
            1,
            &MediaType::octet_stream(),
            Some(BackendKey::new("c4/x").unwrap()),
        );
        catalog.insert(&record).await.unwrap();

        let counter = CounterPlacement::new(CounterConfig::default());
        assert_eq!(rebuild_counters(&catalog, &counter).await.unwrap(), 1);
        assert_eq!(counter.count("c4"), 1);
    }
}
