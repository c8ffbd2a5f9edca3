//! Storage backend port for Stash.
//!
//! Every place Stash keeps object bytes is reached through the [`Backend`]
//! trait. The core never assumes filesystem semantics from a backend: no
//! atomic rename, no directory listing order, no shared temp space.
//!
//! # Backends
//!
//! - [`InMemoryBackend`] -- `HashMap`-based backend for tests and embedding
//! - [`LocalDirBackend`] -- objects as files under a root directory
//!
//! # Rules
//!
//! 1. Keys are opaque [`BackendKey`]s; backends may map `/` to directories.
//! 2. `put` either stores the full object or reports an error.
//! 3. Writing the same key twice with the same bytes is harmless.
//! 4. A missing key is always [`BackendError::NotFound`], never an I/O error.
//!
//! [`BackendKey`]: stash_types::BackendKey

pub mod error;
pub mod local;
pub mod memory;
pub mod traits;

pub use error::{BackendError, BackendResult};
pub use local::LocalDirBackend;
pub use memory::InMemoryBackend;
pub use traits::{Backend, ObjectReader};
