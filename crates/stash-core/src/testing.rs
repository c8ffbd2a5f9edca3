//! Fixtures shared by the pipeline tests.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

use stash_backend::{Backend, BackendError, BackendResult, InMemoryBackend, ObjectReader};
use stash_cache::CacheConfig;
use stash_catalog::{Catalog, CatalogError, CatalogResult, InMemoryCatalog};
use stash_hasher::HasherConfig;
use stash_types::{AssetId, AssetRecord, BackendKey, ContentDigest};

use crate::placement::{content_key, Placement};
use crate::retrieve::Download;
use crate::store::AssetStore;

pub(crate) const TEST_LIMIT: u64 = 1024 * 1024;

/// A store over in-memory parts with a scratch cache directory.
pub(crate) struct Harness {
    pub store: Arc<AssetStore>,
    pub backend: Arc<FaultyBackend>,
    pub catalog: Arc<ScriptedCatalog>,
    _cache_dir: TempDir,
}

pub(crate) async fn harness() -> Harness {
    harness_with(Placement::ContentAddressed, TEST_LIMIT).await
}

pub(crate) async fn harness_with(placement: Placement, max_size: u64) -> Harness {
    harness_over(Arc::new(ScriptedCatalog::default()), placement, max_size).await
}

pub(crate) async fn harness_over(
    catalog: Arc<ScriptedCatalog>,
    placement: Placement,
    max_size: u64,
) -> Harness {
    let cache_dir = TempDir::new().unwrap();
    let backend = Arc::new(FaultyBackend::default());
    let store = AssetStore::builder(backend.clone(), catalog.clone())
        .hasher(HasherConfig {
            max_size,
            spool_dir: None,
        })
        .cache(CacheConfig {
            dir: cache_dir.path().to_path_buf(),
            ..CacheConfig::default()
        })
        .placement(placement)
        .open()
        .await
        .unwrap();
    Harness {
        store: Arc::new(store),
        backend,
        catalog,
        _cache_dir: cache_dir,
    }
}

pub(crate) async fn read_download(mut download: Download) -> Vec<u8> {
    let mut out = Vec::new();
    download.reader.read_to_end(&mut out).await.unwrap();
    out
}

pub(crate) fn png(body: &[u8]) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.extend_from_slice(body);
    data
}

/// In-memory backend with switchable failures.
#[derive(Default)]
pub(crate) struct FaultyBackend {
    pub inner: InMemoryBackend,
    pub fail_put: AtomicBool,
    pub fail_remove: AtomicBool,
}

fn injected() -> BackendError {
    BackendError::Io(io::Error::other("injected failure"))
}

#[async_trait]
impl Backend for FaultyBackend {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn put(&self, key: &BackendKey, reader: ObjectReader, size: u64) -> BackendResult<()> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.put(key, reader, size).await
    }

    async fn get(&self, key: &BackendKey) -> BackendResult<ObjectReader> {
        self.inner.get(key).await
    }

    async fn remove(&self, key: &BackendKey) -> BackendResult<bool> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.inner.remove(key).await
    }

    async fn exists(&self, key: &BackendKey) -> BackendResult<bool> {
        self.inner.exists(key).await
    }

    async fn size(&self, key: &BackendKey) -> BackendResult<u64> {
        self.inner.size(key).await
    }

    async fn list_keys(&self) -> BackendResult<Vec<BackendKey>> {
        self.inner.list_keys().await
    }
}

/// In-memory catalog that can hide digests from lookups or refuse inserts.
#[derive(Default)]
pub(crate) struct ScriptedCatalog {
    pub inner: InMemoryCatalog,
    /// Number of upcoming `get_by_digest` calls that report nothing.
    pub blind_lookups: AtomicUsize,
    pub fail_insert: AtomicBool,
    /// Backend whose content object the next insert deletes before
    /// reporting a conflict, as if a winner committed and was deleted.
    vanishing_winner: Mutex<Option<Arc<FaultyBackend>>>,
    /// Make the backend refuse writes once the winner has vanished.
    pub fail_put_on_vanish: AtomicBool,
}

impl ScriptedCatalog {
    pub fn blind(lookups: usize) -> Self {
        let catalog = Self::default();
        catalog.blind_lookups.store(lookups, Ordering::SeqCst);
        catalog
    }

    pub fn vanish_next_winner(&self, backend: Arc<FaultyBackend>) {
        *self.vanishing_winner.lock().expect("lock poisoned") = Some(backend);
    }
}

#[async_trait]
impl Catalog for ScriptedCatalog {
    async fn insert(&self, record: &AssetRecord) -> CatalogResult<()> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(CatalogError::Corrupt("injected failure".into()));
        }
        let vanished = self.vanishing_winner.lock().expect("lock poisoned").take();
        if let Some(backend) = vanished {
            let key = content_key(&record.content_digest).unwrap();
            backend.inner.remove(&key).await.unwrap();
            if self.fail_put_on_vanish.load(Ordering::SeqCst) {
                backend.fail_put.store(true, Ordering::SeqCst);
            }
            return Err(CatalogError::Conflict {
                digest: record.content_digest,
            });
        }
        self.inner.insert(record).await
    }

    async fn get(&self, id: &AssetId) -> CatalogResult<Option<AssetRecord>> {
        self.inner.get(id).await
    }

    async fn get_by_digest(&self, digest: &ContentDigest) -> CatalogResult<Option<AssetRecord>> {
        let blinded = self
            .blind_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if blinded {
            return Ok(None);
        }
        self.inner.get_by_digest(digest).await
    }

    async fn get_by_storage_key(&self, key: &BackendKey) -> CatalogResult<Option<AssetRecord>> {
        self.inner.get_by_storage_key(key).await
    }

    async fn delete(&self, id: &AssetId) -> CatalogResult<bool> {
        self.inner.delete(id).await
    }

    async fn list_page(&self, limit: usize, offset: usize) -> CatalogResult<Vec<AssetRecord>> {
        self.inner.list_page(limit, offset).await
    }

    async fn count(&self) -> CatalogResult<u64> {
        self.inner.count().await
    }

    async fn all_storage_keys(&self) -> CatalogResult<Vec<BackendKey>> {
        self.inner.all_storage_keys().await
    }
}
