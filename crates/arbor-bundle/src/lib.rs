//! Bundles: the unit of storage for one node and all of its properties.
//!
//! A [`NodePropBundle`] holds a node's header fields (parent, primary type,
//! mixins, child entries) together with every property record. Binary
//! values above a size threshold are moved out of the bundle into a
//! [`BlobStore`] and replaced by a reference.
//!
//! # Design Rules
//!
//! 1. `jcr:uuid`, `jcr:primaryType` and `jcr:mixinTypes` are never stored
//!    as property records; they are derived from the header on demand.
//! 2. Replacing or removing a property releases its externalized blobs.
//! 3. Bundle records on disk are length- and CRC-framed ([`codec`]).

pub mod blob;
pub mod bundle;
pub mod codec;
pub mod error;

pub use blob::{BlobStore, FileBlobStore, InMemoryBlobStore};
pub use bundle::{BundleValue, NodePropBundle, PropertyEntry};
pub use error::{StorageError, StorageResult};
