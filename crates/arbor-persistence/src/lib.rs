//! Bundle persistence for the Arbor content repository.
//!
//! The [`BundlePersistenceManager`] sits between the session layer and a
//! [`BundleBackend`]. Reads go through a memory-bounded [`BundleCache`]
//! that also remembers which nodes do not exist; writes apply a whole
//! [`ChangeLog`](arbor_types::ChangeLog) as a batch of bundle updates.
//!
//! # Backends
//!
//! - [`InMemoryBackend`]: volatile, for tests and embedding.
//! - [`FileSystemBackend`]: one record file per bundle under a fan-out
//!   directory tree, large binaries in a separate blob tree.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod fs;
pub mod manager;
pub mod memory;

pub use backend::BundleBackend;
pub use cache::{BundleCache, CacheLookup, MISSING_WEIGHT};
pub use config::PersistenceConfig;
pub use error::{PersistenceError, Result};
pub use fs::FileSystemBackend;
pub use manager::BundlePersistenceManager;
pub use memory::InMemoryBackend;
