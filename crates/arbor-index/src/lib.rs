//! String interning and storage path derivation for Arbor.
//!
//! Namespace URIs and local names are long and highly repetitive, so
//! storage locations refer to them through small integers handed out by a
//! [`StringIndex`]. Two independent indices are kept: one for namespace
//! URIs and one for local names.
//!
//! # Modules
//!
//! - [`traits`]: the [`StringIndex`] contract
//! - [`memory`]: volatile [`InMemoryStringIndex`], also used as the
//!   namespace registry fallback
//! - [`file`]: [`FileBasedIndex`], persisted as a JSON map
//! - [`paths`]: fan-out folder paths and [`StoragePaths`]
//! - [`error`]: [`IndexError`]

pub mod error;
pub mod file;
pub mod memory;
pub mod paths;
pub mod traits;

pub use error::{IndexError, IndexResult};
pub use file::FileBasedIndex;
pub use memory::InMemoryStringIndex;
pub use paths::{node_folder_path, StoragePaths};
pub use traits::StringIndex;
