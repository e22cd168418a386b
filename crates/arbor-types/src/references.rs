use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::{NodeId, PropertyId};

/// The set of reference properties pointing at one target node.
///
/// Reference lists are stored apart from bundles because they are looked up
/// by target rather than by the node that owns the referring property.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReferences {
    target: NodeId,
    references: BTreeSet<PropertyId>,
}

impl NodeReferences {
    /// An empty list for `target`.
    pub fn new(target: NodeId) -> Self {
        Self {
            target,
            references: BTreeSet::new(),
        }
    }

    pub fn target_id(&self) -> NodeId {
        self.target
    }

    /// Returns `true` while at least one property still refers to the target.
    pub fn has_references(&self) -> bool {
        !self.references.is_empty()
    }

    pub fn references(&self) -> impl Iterator<Item = &PropertyId> {
        self.references.iter()
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    /// Record a referrer. Returns `false` if it was already present.
    pub fn add_reference(&mut self, referrer: PropertyId) -> bool {
        self.references.insert(referrer)
    }

    /// Drop a referrer. Returns `true` if it was present.
    pub fn remove_reference(&mut self, referrer: &PropertyId) -> bool {
        self.references.remove(referrer)
    }
}
