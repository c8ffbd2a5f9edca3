use std::sync::Arc;

use tracing::info;

use stash_backend::Backend;
use stash_cache::{CacheConfig, LocalCache};
use stash_catalog::Catalog;
use stash_hasher::{ContentHasher, HasherConfig};
use stash_types::AssetRecord;

use crate::error::{StashError, StashResult};
use crate::placement::Placement;

/// One page of the catalog listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetPage {
    /// Records, newest first.
    pub assets: Vec<AssetRecord>,
    /// Total records in the catalog.
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

/// The asset store: ingest, retrieve, delete and list over a backend, a
/// catalog and a local cache.
///
/// All state is shared, so one `AssetStore` behind an `Arc` serves every
/// caller concurrently.
pub struct AssetStore {
    pub(crate) hasher: ContentHasher,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) catalog: Arc<dyn Catalog>,
    pub(crate) cache: Arc<LocalCache>,
    pub(crate) placement: Placement,
}

impl AssetStore {
    pub fn builder(backend: Arc<dyn Backend>, catalog: Arc<dyn Catalog>) -> AssetStoreBuilder {
        AssetStoreBuilder {
            backend,
            catalog,
            hasher: HasherConfig::default(),
            cache: CacheConfig::default(),
            placement: Placement::ContentAddressed,
        }
    }

    /// List one page of records, newest first.
    pub async fn list(&self, limit: usize, offset: usize) -> StashResult<AssetPage> {
        let total = self
            .catalog
            .count()
            .await
            .map_err(StashError::CatalogReadFailed)?;
        let assets = self
            .catalog
            .list_page(limit, offset)
            .await
            .map_err(StashError::CatalogReadFailed)?;
        Ok(AssetPage {
            assets,
            total,
            limit,
            offset,
        })
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn cache(&self) -> &Arc<LocalCache> {
        &self.cache
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    /// Upload size bound in bytes.
    pub fn max_upload_size(&self) -> u64 {
        self.hasher.max_size()
    }
}

impl std::fmt::Debug for AssetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetStore")
            .field("backend", &self.backend.name())
            .field("placement", &self.placement.mode())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Builder for [`AssetStore`].
pub struct AssetStoreBuilder {
    backend: Arc<dyn Backend>,
    catalog: Arc<dyn Catalog>,
    hasher: HasherConfig,
    cache: CacheConfig,
    placement: Placement,
}

impl AssetStoreBuilder {
    pub fn hasher(mut self, config: HasherConfig) -> Self {
        self.hasher = config;
        self
    }

    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Open the cache and, under counter placement, rebuild the shard
    /// counters from the catalog.
    pub async fn open(self) -> StashResult<AssetStore> {
        let cache = Arc::new(LocalCache::new(self.cache, Arc::clone(&self.backend))?);
        let store = AssetStore {
            hasher: ContentHasher::new(self.hasher),
            backend: self.backend,
            catalog: self.catalog,
            cache,
            placement: self.placement,
        };
        if let Placement::Counter(counter) = &store.placement {
            let keys = crate::reconcile::rebuild_counters(store.catalog.as_ref(), counter).await?;
            info!(keys, "rebuilt shard counters");
        }
        info!(
            backend = store.backend.name(),
            placement = store.placement.mode(),
            max_upload_size = store.max_upload_size(),
            "asset store ready"
        );
        Ok(store)
    }
}
