use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use stash_types::{AssetId, AssetRecord, BackendKey, ContentDigest};

use crate::error::{CatalogError, CatalogResult};
use crate::traits::Catalog;

#[derive(Default)]
struct Tables {
    records: HashMap<AssetId, AssetRecord>,
    by_digest: HashMap<ContentDigest, AssetId>,
    by_key: HashMap<BackendKey, AssetId>,
}

/// In-memory catalog.
///
/// The digest index is checked and updated under a single write lock, which
/// makes `insert` the same atomic compare-and-set a unique index provides.
#[derive(Default)]
pub struct InMemoryCatalog {
    tables: RwLock<Tables>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().expect("lock poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn insert(&self, record: &AssetRecord) -> CatalogResult<()> {
        let mut tables = self.tables.write().expect("lock poisoned");
        if tables.by_digest.contains_key(&record.content_digest) {
            return Err(CatalogError::Conflict {
                digest: record.content_digest,
            });
        }
        if tables.records.contains_key(&record.id) {
            return Err(CatalogError::Duplicate {
                column: "id",
                value: record.id.to_string(),
            });
        }
        if let Some(key) = &record.storage_key {
            if tables.by_key.contains_key(key) {
                return Err(CatalogError::Duplicate {
                    column: "storage_key",
                    value: key.to_string(),
                });
            }
            tables.by_key.insert(key.clone(), record.id);
        }
        tables.by_digest.insert(record.content_digest, record.id);
        tables.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: &AssetId) -> CatalogResult<Option<AssetRecord>> {
        let tables = self.tables.read().expect("lock poisoned");
        Ok(tables.records.get(id).cloned())
    }

    async fn get_by_digest(&self, digest: &ContentDigest) -> CatalogResult<Option<AssetRecord>> {
        let tables = self.tables.read().expect("lock poisoned");
        Ok(tables
            .by_digest
            .get(digest)
            .and_then(|id| tables.records.get(id))
            .cloned())
    }

    async fn get_by_storage_key(&self, key: &BackendKey) -> CatalogResult<Option<AssetRecord>> {
        let tables = self.tables.read().expect("lock poisoned");
        Ok(tables
            .by_key
            .get(key)
            .and_then(|id| tables.records.get(id))
            .cloned())
    }

    async fn delete(&self, id: &AssetId) -> CatalogResult<bool> {
        let mut tables = self.tables.write().expect("lock poisoned");
        let Some(record) = tables.records.remove(id) else {
            return Ok(false);
        };
        tables.by_digest.remove(&record.content_digest);
        if let Some(key) = &record.storage_key {
            tables.by_key.remove(key);
        }
        Ok(true)
    }

    async fn list_page(&self, limit: usize, offset: usize) -> CatalogResult<Vec<AssetRecord>> {
        let tables = self.tables.read().expect("lock poisoned");
        let mut records: Vec<&AssetRecord> = tables.records.values().collect();
        records.sort_by_key(|r| Reverse((r.created_at, r.id)));
        Ok(records
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> CatalogResult<u64> {
        Ok(self.len() as u64)
    }

    async fn all_storage_keys(&self) -> CatalogResult<Vec<BackendKey>> {
        let tables = self.tables.read().expect("lock poisoned");
        Ok(tables.by_key.keys().cloned().collect())
    }
}

impl std::fmt::Debug for InMemoryCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCatalog")
            .field("record_count", &self.len())
            .finish()
    }
}
