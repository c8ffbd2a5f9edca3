//! Mapping from content (or, in the legacy mode, asset ids) to backend keys.

use std::collections::HashMap;
use std::sync::Mutex;

use stash_types::{AssetId, AssetRecord, BackendKey, ContentDigest, TypeError};

/// Default soft capacity of one shard directory.
pub const DEFAULT_FILES_PER_DIR: u64 = 5000;

/// Default number of hex pairs in a counter shard path.
pub const DEFAULT_SHARD_DEPTH: usize = 1;

/// Default number of overflow buckets probed under a full shard.
pub const DEFAULT_OVERFLOW_BUCKETS: usize = 16;

const MAX_SHARD_DEPTH: usize = 32;

/// Key for content-addressed placement: `digest[0:2]/digest`.
pub fn content_key(digest: &ContentDigest) -> Result<BackendKey, TypeError> {
    let hex = digest.to_hex();
    BackendKey::join(&hex[..2], &hex)
}

/// Placement policy of a deployment.
///
/// Switching policy for an existing deployment requires migrating every
/// stored key.
#[derive(Debug, Default)]
pub enum Placement {
    /// Keys derived from the content digest. Stateless.
    #[default]
    ContentAddressed,
    /// Legacy counter-based shards with overflow buckets.
    Counter(CounterPlacement),
}

impl Placement {
    pub fn is_content_addressed(&self) -> bool {
        matches!(self, Self::ContentAddressed)
    }

    /// Name used in logs and config.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::ContentAddressed => "content",
            Self::Counter(_) => "counter",
        }
    }

    /// Backend key of an existing record.
    ///
    /// A stored key always wins; otherwise the key is recomputed from the
    /// digest.
    pub fn key_for(&self, record: &AssetRecord) -> Result<BackendKey, TypeError> {
        match &record.storage_key {
            Some(key) => Ok(key.clone()),
            None => content_key(&record.content_digest),
        }
    }

    /// Give back the shard slot held by `key`. No-op for content placement.
    pub fn release(&self, key: &BackendKey) {
        if let Self::Counter(counter) = self {
            counter.release_key(key);
        }
    }
}

/// Tuning for [`CounterPlacement`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterConfig {
    /// Number of hex pairs in the base shard path, one segment per pair.
    pub shard_depth: usize,
    /// Soft capacity per directory.
    pub files_per_dir: u64,
    /// Overflow buckets probed when the base shard is full.
    pub overflow_buckets: usize,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            shard_depth: DEFAULT_SHARD_DEPTH,
            files_per_dir: DEFAULT_FILES_PER_DIR,
            overflow_buckets: DEFAULT_OVERFLOW_BUCKETS,
        }
    }
}

/// Counter-based shard placement.
///
/// Keeps an in-memory `dir -> object count` map. The map is a cache of what
/// the catalog already knows: it is never persisted and is rebuilt from
/// stored keys at startup. The mutex is held only for the probe and the
/// increment.
pub struct CounterPlacement {
    config: CounterConfig,
    counters: Mutex<HashMap<String, u64>>,
}

impl CounterPlacement {
    pub fn new(mut config: CounterConfig) -> Self {
        config.shard_depth = config.shard_depth.clamp(1, MAX_SHARD_DEPTH);
        Self {
            config,
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    /// Base shard directory for `id`: leading hex pairs of `blake3(id)`.
    pub fn base_shard(&self, id: &AssetId) -> String {
        let hash = blake3::hash(id.to_string().as_bytes());
        hash.as_bytes()[..self.config.shard_depth]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Pick a directory under `base` and take a slot in it.
    ///
    /// The base shard is used while below capacity, then the lowest-indexed
    /// `base/bucket_i` below capacity. When every bucket is full the base
    /// shard is used anyway.
    pub fn assign(&self, base: &str) -> String {
        let capacity = self.config.files_per_dir;
        let mut counters = self.counters.lock().expect("lock poisoned");

        let chosen = if counters.get(base).copied().unwrap_or(0) < capacity {
            base.to_string()
        } else {
            (0..self.config.overflow_buckets)
                .map(|i| format!("{base}/bucket_{i}"))
                .find(|dir| counters.get(dir).copied().unwrap_or(0) < capacity)
                .unwrap_or_else(|| base.to_string())
        };
        *counters.entry(chosen.clone()).or_insert(0) += 1;
        chosen
    }

    /// Assign a directory for `id` and return the object key `dir/<id>`.
    pub fn place(&self, id: &AssetId) -> Result<BackendKey, TypeError> {
        let dir = self.assign(&self.base_shard(id));
        let key = BackendKey::join(&dir, &id.to_string());
        if key.is_err() {
            self.release(&dir);
        }
        key
    }

    /// Give back one slot in `dir`.
    pub fn release(&self, dir: &str) {
        let mut counters = self.counters.lock().expect("lock poisoned");
        if let Some(count) = counters.get_mut(dir) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counters.remove(dir);
            }
        }
    }

    /// Give back the slot held by an object key.
    pub fn release_key(&self, key: &BackendKey) {
        if let Some(dir) = key.parent() {
            self.release(dir);
        }
    }

    /// Replace the counters with a fresh count of `keys`.
    pub fn rebuild<'a>(&self, keys: impl IntoIterator<Item = &'a BackendKey>) {
        let mut fresh: HashMap<String, u64> = HashMap::new();
        for key in keys {
            if let Some(dir) = key.parent() {
                *fresh.entry(dir.to_string()).or_insert(0) += 1;
            }
        }
        *self.counters.lock().expect("lock poisoned") = fresh;
    }

    /// Current count for `dir`.
    pub fn count(&self, dir: &str) -> u64 {
        self.counters
            .lock()
            .expect("lock poisoned")
            .get(dir)
            .copied()
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for CounterPlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dirs = self.counters.lock().expect("lock poisoned").len();
        f.debug_struct("CounterPlacement")
            .field("config", &self.config)
            .field("dirs", &dirs)
            .finish()
    }
}
