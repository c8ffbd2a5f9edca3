//! Local disk cache tier for Stash.
//!
//! [`LocalCache`] mirrors backend objects on local disk. Reads are served
//! from the mirror when it holds a fresh copy; otherwise the object is
//! fetched from the [`Backend`](stash_backend::Backend) in full, written into
//! the mirror, and then served.
//!
//! # Eviction
//!
//! [`LocalCache::sweep`] enforces two bounds:
//!
//! 1. entries not accessed within `max_age` are removed;
//! 2. while the mirror exceeds `max_size`, least-recently-used entries are
//!    removed.
//!
//! Every open [`CacheHandle`] pins its entry. Pinned entries are never
//! evicted, so a sweep cannot pull a file out from under a reader.

pub mod cache;
pub mod error;

pub use cache::{CacheConfig, CacheHandle, CacheStats, LocalCache, SweepReport};
pub use error::{CacheError, CacheResult};
