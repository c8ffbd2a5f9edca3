//! Foundation types for Stash.
//!
//! This crate provides the identity and record types shared by every other
//! Stash crate.
//!
//! # Key Types
//!
//! - [`AssetId`] - time-ordered asset identifier (UUID v7)
//! - [`ContentDigest`] - BLAKE3 digest of an asset's bytes
//! - [`BackendKey`] - validated relative key into a storage backend
//! - [`AssetRecord`] - the catalog's unit of metadata
//! - [`MediaType`] - sniffed MIME type and canonical extension

pub mod digest;
pub mod error;
pub mod id;
pub mod key;
pub mod media;
pub mod record;

pub use digest::ContentDigest;
pub use error::TypeError;
pub use id::AssetId;
pub use key::BackendKey;
pub use media::MediaType;
pub use record::AssetRecord;
