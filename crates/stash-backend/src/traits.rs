use async_trait::async_trait;
use tokio::io::AsyncRead;

use stash_types::BackendKey;

use crate::error::BackendResult;

/// Byte stream handed to or returned from a backend.
pub type ObjectReader = Box<dyn AsyncRead + Send + Unpin>;

/// Object storage backend.
///
/// All implementations must satisfy these invariants:
/// - `put` stores exactly `size` bytes or fails; a short or long stream is an
///   error and leaves nothing readable under the key.
/// - Overwriting a key with identical bytes is a no-op from a reader's view.
/// - `get`, `size` and `remove` report a missing key distinctly.
/// - All I/O errors are propagated, never silently ignored.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Store `size` bytes read from `reader` under `key`.
    async fn put(&self, key: &BackendKey, reader: ObjectReader, size: u64) -> BackendResult<()>;

    /// Open the object stored under `key`.
    ///
    /// Returns [`BackendError::NotFound`](crate::BackendError::NotFound) if absent.
    async fn get(&self, key: &BackendKey) -> BackendResult<ObjectReader>;

    /// Remove the object under `key`. Returns `true` if it existed.
    async fn remove(&self, key: &BackendKey) -> BackendResult<bool>;

    /// Check whether an object is stored under `key`.
    async fn exists(&self, key: &BackendKey) -> BackendResult<bool>;

    /// Size in bytes of the object under `key`.
    async fn size(&self, key: &BackendKey) -> BackendResult<u64>;

    /// Every key currently stored. Used by orphan sweeps.
    async fn list_keys(&self) -> BackendResult<Vec<BackendKey>>;
}
