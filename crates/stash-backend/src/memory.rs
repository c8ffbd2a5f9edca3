use std::collections::HashMap;
use std::io::Cursor;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;

use stash_types::BackendKey;

use crate::error::{BackendError, BackendResult};
use crate::traits::{Backend, ObjectReader};

/// In-memory, HashMap-based backend.
///
/// Intended for tests and embedding. Objects are held as [`Bytes`] behind a
/// `RwLock`, so reads hand out cheap clones and never block writers for long.
pub struct InMemoryBackend {
    objects: RwLock<HashMap<BackendKey, Bytes>>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    /// Copy of the bytes stored under `key`, if any.
    pub fn object(&self, key: &BackendKey) -> Option<Bytes> {
        self.objects.read().expect("lock poisoned").get(key).cloned()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, key: &BackendKey, mut reader: ObjectReader, size: u64) -> BackendResult<()> {
        let mut data = Vec::with_capacity(size as usize);
        reader.read_to_end(&mut data).await?;
        if data.len() as u64 != size {
            return Err(BackendError::SizeMismatch {
                key: key.clone(),
                expected: size,
                actual: data.len() as u64,
            });
        }
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(key.clone(), Bytes::from(data));
        Ok(())
    }

    async fn get(&self, key: &BackendKey) -> BackendResult<ObjectReader> {
        let data = self
            .object(key)
            .ok_or_else(|| BackendError::NotFound(key.clone()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn remove(&self, key: &BackendKey) -> BackendResult<bool> {
        let mut map = self.objects.write().expect("lock poisoned");
        Ok(map.remove(key).is_some())
    }

    async fn exists(&self, key: &BackendKey) -> BackendResult<bool> {
        let map = self.objects.read().expect("lock poisoned");
        Ok(map.contains_key(key))
    }

    async fn size(&self, key: &BackendKey) -> BackendResult<u64> {
        let map = self.objects.read().expect("lock poisoned");
        map.get(key)
            .map(|data| data.len() as u64)
            .ok_or_else(|| BackendError::NotFound(key.clone()))
    }

    async fn list_keys(&self) -> BackendResult<Vec<BackendKey>> {
        let map = self.objects.read().expect("lock poisoned");
        let mut keys: Vec<BackendKey> = map.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("object_count", &self.len())
            .finish()
    }
}
