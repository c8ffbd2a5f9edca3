//! Stash core: the ingest, placement, retrieval and deletion pipelines.
//!
//! [`AssetStore`] ties together a [`Backend`], a [`Catalog`] and a
//! [`LocalCache`]:
//!
//! - [`AssetStore::ingest`] hashes and spools an upload, deduplicates it by
//!   content digest, writes it to the backend and commits a record.
//! - [`AssetStore::retrieve`] resolves a name to a record and opens the
//!   object through the cache.
//! - [`AssetStore::delete`] removes the record, then the object.
//! - [`AssetStore::list`] pages through records, newest first.
//! - [`AssetStore::sweep_orphans`] removes objects no record refers to.
//!
//! Orphaned backend objects are acceptable garbage. A record pointing at
//! missing bytes is not, so every pipeline orders its steps to leave the
//! former on failure, never the latter.
//!
//! [`Backend`]: stash_backend::Backend
//! [`Catalog`]: stash_catalog::Catalog
//! [`LocalCache`]: stash_cache::LocalCache

pub mod delete;
pub mod error;
pub mod ingest;
pub mod placement;
pub mod reconcile;
pub mod retrieve;
pub mod store;

pub use error::{StashError, StashResult};
pub use ingest::IngestOutcome;
pub use placement::{content_key, CounterConfig, CounterPlacement, Placement};
pub use retrieve::Download;
pub use store::{AssetPage, AssetStore, AssetStoreBuilder};

pub use stash_backend::{Backend, InMemoryBackend, LocalDirBackend};
pub use stash_cache::{CacheConfig, LocalCache};
pub use stash_catalog::{Catalog, InMemoryCatalog, SqliteCatalog};
pub use stash_hasher::HasherConfig;
pub use stash_types::{AssetId, AssetRecord, BackendKey, ContentDigest, MediaType};

#[cfg(test)]
mod testing;
