//! Foundation types for the Arbor content repository.
//!
//! Every other Arbor crate depends on `arbor-types`. The types here describe
//! the in-memory item model handed to the persistence layer by the session
//! layer above it: identifiers, qualified names, typed values, node and
//! property states, and the change log that batches them.
//!
//! # Key Types
//!
//! - [`NodeId`]: 128-bit node identifier with a canonical UUID text form
//! - [`PropertyId`]: (parent node, qualified name) pair
//! - [`Name`]: namespace URI + local name
//! - [`InternalValue`] / [`PropertyType`]: typed property values
//! - [`NodeState`] / [`PropertyState`] / [`ItemState`]: item state snapshots
//! - [`ChangeLog`]: an atomic batch of added, modified and deleted states
//! - [`NodeReferences`]: the referrers of one target node

pub mod changelog;
pub mod error;
pub mod id;
pub mod name;
pub mod references;
pub mod state;
pub mod value;

pub use changelog::ChangeLog;
pub use error::TypeError;
pub use id::{ItemId, NodeId, PropertyId};
pub use name::{names, namespaces, Name};
pub use references::NodeReferences;
pub use state::{ChildNodeEntry, ItemState, ItemStatus, NodeState, PropertyState};
pub use value::{InternalValue, PropertyType};
