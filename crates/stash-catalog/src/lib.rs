//! Metadata catalog for Stash.
//!
//! The catalog maps asset ids to [`AssetRecord`]s and is the sole arbiter of
//! the deduplication race: at most one record may exist per content digest,
//! and a losing insert is reported as [`CatalogError::Conflict`].
//!
//! # Implementations
//!
//! - [`InMemoryCatalog`] -- `RwLock<HashMap>` catalog for tests and embedding
//! - [`SqliteCatalog`] -- `sqlx` SQLite catalog with unique indexes
//!
//! [`AssetRecord`]: stash_types::AssetRecord

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::{CatalogError, CatalogResult};
pub use memory::InMemoryCatalog;
pub use sqlite::SqliteCatalog;
pub use traits::Catalog;
