use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use stash_backend::{Backend, BackendError, ObjectReader};
use stash_types::BackendKey;

use crate::error::{CacheError, CacheResult};

const FETCH_SUFFIX: &str = ".fetch";
const COPY_BUF_LEN: usize = 64 * 1024;

/// Configuration for the [`LocalCache`].
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Directory holding the mirror.
    pub dir: PathBuf,
    /// Entries not accessed for longer than this are expired.
    pub max_age: Duration,
    /// Soft bound on total mirrored bytes.
    pub max_size: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("stash-cache"),
            max_age: Duration::from_secs(24 * 60 * 60),
            max_size: 10 * 1024 * 1024 * 1024, // 10 GiB
        }
    }
}

/// Outcome of one eviction sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries removed for exceeding the age bound.
    pub expired: usize,
    /// Entries removed to get back under the size bound.
    pub evicted: usize,
    /// Bytes deleted from disk.
    pub bytes_freed: u64,
}

/// Point-in-time view of the mirror.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
    pub pinned: usize,
}

struct Entry {
    size: u64,
    last_access: SystemTime,
    /// Logical access clock used for LRU ordering.
    tick: u64,
    /// One strong count per open handle, plus the entry's own.
    pin: Arc<()>,
}

impl Entry {
    fn is_pinned(&self) -> bool {
        Arc::strong_count(&self.pin) > 1
    }
}

/// Disk-backed read-through cache in front of a [`Backend`].
///
/// Mirror layout follows the key: object `ab/ab12…` lives at
/// `{dir}/ab/ab12…`. In-flight downloads are written to hidden
/// `.{name}.{uuid}.fetch` files next to their target and renamed into place.
pub struct LocalCache {
    config: CacheConfig,
    backend: Arc<dyn Backend>,
    entries: Mutex<HashMap<BackendKey, Entry>>,
    clock: AtomicU64,
}

impl LocalCache {
    /// Open the cache, indexing whatever an earlier process left in `dir`.
    pub fn new(config: CacheConfig, backend: Arc<dyn Backend>) -> CacheResult<Self> {
        std::fs::create_dir_all(&config.dir)?;
        let entries = scan(&config.dir)?;
        let bytes: u64 = entries.values().map(|e| e.size).sum();
        info!(
            path = %config.dir.display(),
            entries = entries.len(),
            bytes,
            backend = backend.name(),
            "opened local cache"
        );
        let clock = AtomicU64::new(entries.len() as u64);
        Ok(Self {
            config,
            backend,
            entries: Mutex::new(entries),
            clock,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Open `key` for reading, fetching it from the backend on a miss.
    ///
    /// A miss blocks until the whole object is mirrored.
    pub async fn open(&self, key: &BackendKey) -> CacheResult<CacheHandle> {
        if let Some(handle) = self.open_mirrored(key, SystemTime::now()).await? {
            debug!(key = %key, "cache hit");
            return Ok(handle);
        }
        debug!(key = %key, "cache miss");
        self.fetch(key).await
    }

    /// Size of the object under `key`, from the mirror when possible.
    pub async fn stat(&self, key: &BackendKey) -> CacheResult<u64> {
        if let Some(size) = self.lock().get(key).map(|e| e.size) {
            return Ok(size);
        }
        Ok(self.backend.size(key).await?)
    }

    /// Drop `key` from the mirror. Returns `true` if anything was removed.
    ///
    /// Handles that are already open keep reading the unlinked file.
    pub async fn invalidate(&self, key: &BackendKey) -> CacheResult<bool> {
        let indexed = self.lock().remove(key).is_some();
        match tokio::fs::remove_file(self.mirror_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(indexed),
            Err(e) => Err(e.into()),
        }
    }

    /// Enforce the age and size bounds.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(SystemTime::now()).await
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let report = cache.sweep().await;
                debug!(?report, "periodic cache sweep");
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        CacheStats {
            entries: entries.len(),
            bytes: entries.values().map(|e| e.size).sum(),
            pinned: entries.values().filter(|e| e.is_pinned()).count(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<BackendKey, Entry>> {
        self.entries.lock().expect("lock poisoned")
    }

    fn next_tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn is_fresh(&self, entry: &Entry, now: SystemTime) -> bool {
        now.duration_since(entry.last_access)
            .map(|age| age <= self.config.max_age)
            .unwrap_or(true)
    }

    fn mirror_path(&self, key: &BackendKey) -> PathBuf {
        key.segments()
            .fold(self.config.dir.clone(), |path, segment| path.join(segment))
    }

    async fn open_mirrored(
        &self,
        key: &BackendKey,
        now: SystemTime,
    ) -> CacheResult<Option<CacheHandle>> {
        let (pin, size) = {
            let mut entries = self.lock();
            let Some(entry) = entries.get_mut(key) else {
                return Ok(None);
            };
            if !self.is_fresh(entry, now) {
                return Ok(None);
            }
            entry.last_access = now;
            entry.tick = self.next_tick();
            (Arc::clone(&entry.pin), entry.size)
        };

        match tokio::fs::File::open(self.mirror_path(key)).await {
            Ok(file) => Ok(Some(CacheHandle {
                file,
                size,
                key: key.clone(),
                _pin: pin,
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(key = %key, "mirrored file vanished; refetching");
                drop(pin);
                self.lock().remove(key);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch(&self, key: &BackendKey) -> CacheResult<CacheHandle> {
        let mut reader = self.backend.get(key).await?;

        let path = self.mirror_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = fetch_path(&path);
        let size = match copy_to_file(&mut reader, &temp).await {
            Ok(size) => size,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(e);
            }
        };

        // Opened before the rename so a racing sweep cannot unlink it first.
        let file = tokio::fs::File::open(&temp).await?;
        if let Err(e) = tokio::fs::rename(&temp, &path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        let pin = {
            let entry = Entry {
                size,
                last_access: SystemTime::now(),
                tick: self.next_tick(),
                pin: Arc::new(()),
            };
            let pin = Arc::clone(&entry.pin);
            self.lock().insert(key.clone(), entry);
            pin
        };
        debug!(key = %key, size, "mirrored object");

        let report = self.sweep().await;
        if report.expired + report.evicted > 0 {
            debug!(?report, "access-triggered cache sweep");
        }

        Ok(CacheHandle {
            file,
            size,
            key: key.clone(),
            _pin: pin,
        })
    }

    async fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let victims = {
            let mut entries = self.lock();

            let expired: Vec<BackendKey> = entries
                .iter()
                .filter(|(_, e)| !e.is_pinned() && !self.is_fresh(e, now))
                .map(|(k, _)| k.clone())
                .collect();
            let expired: Vec<(BackendKey, u64)> = expired
                .into_iter()
                .filter_map(|k| entries.remove(&k).map(|e| (k, e.size)))
                .collect();

            let mut total: u64 = entries.values().map(|e| e.size).sum();
            let mut evicted = Vec::new();
            if total > self.config.max_size {
                let mut candidates: Vec<(u64, BackendKey)> = entries
                    .iter()
                    .filter(|(_, e)| !e.is_pinned())
                    .map(|(k, e)| (e.tick, k.clone()))
                    .collect();
                candidates.sort();
                for (_, key) in candidates {
                    if total <= self.config.max_size {
                        break;
                    }
                    if let Some(entry) = entries.remove(&key) {
                        total -= entry.size;
                        evicted.push((key, entry.size));
                    }
                }
            }
            (expired, evicted)
        };

        let (expired, evicted) = victims;
        let mut report = SweepReport {
            expired: expired.len(),
            evicted: evicted.len(),
            bytes_freed: 0,
        };
        for (key, size) in expired.iter().chain(evicted.iter()) {
            match tokio::fs::remove_file(self.mirror_path(key)).await {
                Ok(()) => report.bytes_freed += size,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(key = %key, error = %e, "failed to remove cache entry"),
            }
        }
        if report.expired + report.evicted > 0 {
            info!(
                expired = report.expired,
                evicted = report.evicted,
                bytes_freed = report.bytes_freed,
                "cache sweep"
            );
        }
        report
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("LocalCache")
            .field("dir", &self.config.dir)
            .field("entries", &stats.entries)
            .field("bytes", &stats.bytes)
            .finish()
    }
}

/// Readable handle to a mirrored object.
///
/// While the handle is alive its entry is pinned and will not be evicted.
pub struct CacheHandle {
    file: tokio::fs::File,
    size: u64,
    key: BackendKey,
    _pin: Arc<()>,
}

impl CacheHandle {
    /// Exact size of the object in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn key(&self) -> &BackendKey {
        &self.key
    }
}

impl AsyncRead for CacheHandle {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl std::fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandle")
            .field("key", &self.key)
            .field("size", &self.size)
            .finish()
    }
}

fn fetch_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}{FETCH_SUFFIX}", uuid::Uuid::now_v7().simple()))
}

/// Copy the backend stream into `path`, keeping backend and disk failures apart.
async fn copy_to_file(reader: &mut ObjectReader, path: &Path) -> CacheResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut buf = vec![0u8; COPY_BUF_LEN];
    let mut size = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| CacheError::Backend(BackendError::Io(e)))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        size += n as u64;
    }
    file.flush().await?;
    Ok(size)
}

/// Index the files already in `dir`, oldest first, and clear stale downloads.
fn scan(dir: &Path) -> io::Result<HashMap<BackendKey, Entry>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') && name.ends_with(FETCH_SUFFIX) {
            std::fs::remove_file(entry.path())?;
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let key = match BackendKey::new(segments.join("/")) {
            Ok(key) => key,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping unrecognised cache file");
                continue;
            }
        };
        let meta = entry.metadata().map_err(io::Error::from)?;
        let modified = meta.modified().unwrap_or_else(|_| SystemTime::now());
        found.push((modified, key, meta.len()));
    }

    found.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(found
        .into_iter()
        .enumerate()
        .map(|(i, (modified, key, size))| {
            let entry = Entry {
                size,
                last_access: modified,
                tick: i as u64,
                pin: Arc::new(()),
            };
            (key, entry)
        })
        .collect())
}
