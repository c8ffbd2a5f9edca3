//! Streaming content hasher for Stash.
//!
//! Turns an upload stream of unknown length into everything ingestion needs
//! to know before committing it: the BLAKE3 [`ContentDigest`], the exact
//! size, a sniffed [`MediaType`], and a [`Spool`] holding the consumed bytes
//! so they can be re-read for the backend write.
//!
//! The payload is never buffered whole in memory; only the sniffing prefix
//! and one copy buffer are held at a time.
//!
//! [`ContentDigest`]: stash_types::ContentDigest
//! [`MediaType`]: stash_types::MediaType

pub mod error;
pub mod hasher;
pub mod sniff;

pub use error::{HashError, HashResult};
pub use hasher::{ContentHasher, HashedContent, HasherConfig, Spool, SNIFF_LEN};
pub use sniff::sniff;
