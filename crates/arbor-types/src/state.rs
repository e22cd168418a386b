//! Item state snapshots exchanged between the session layer and the
//! persistence layer.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::{ItemId, NodeId, PropertyId};
use crate::name::Name;
use crate::value::{InternalValue, PropertyType};

/// Lifecycle status of an item state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    /// Created in the current batch, not yet persisted.
    New,
    /// Persisted and unchanged.
    Existing,
    /// Persisted and changed in the current batch.
    ExistingModified,
    /// Persisted and removed in the current batch.
    ExistingRemoved,
}

/// A child node reference held by its parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildNodeEntry {
    pub name: Name,
    pub id: NodeId,
    /// 1-based index among siblings sharing the same name.
    pub index: u32,
}

/// State of one node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub id: NodeId,
    /// `None` only for the root node.
    pub parent_id: Option<NodeId>,
    pub node_type_name: Name,
    pub mixin_type_names: BTreeSet<Name>,
    pub child_node_entries: Vec<ChildNodeEntry>,
    pub property_names: BTreeSet<Name>,
    pub status: ItemStatus,
}

impl NodeState {
    /// A state with status [`ItemStatus::New`], the given type and parent,
    /// and no mixins, children or properties.
    pub fn new(id: NodeId, node_type_name: Name, parent_id: Option<NodeId>) -> Self {
        Self {
            id,
            parent_id,
            node_type_name,
            mixin_type_names: BTreeSet::new(),
            child_node_entries: Vec::new(),
            property_names: BTreeSet::new(),
            status: ItemStatus::New,
        }
    }

    /// Append a child entry and return its same-name sibling index.
    pub fn add_child_node_entry(&mut self, name: Name, id: NodeId) -> u32 {
        let index = self
            .child_node_entries
            .iter()
            .filter(|e| e.name == name)
            .count() as u32
            + 1;
        self.child_node_entries.push(ChildNodeEntry { name, id, index });
        index
    }

    /// Remove the child entry for `id`, renumbering later same-name siblings.
    pub fn remove_child_node_entry(&mut self, id: &NodeId) -> Option<ChildNodeEntry> {
        let pos = self.child_node_entries.iter().position(|e| &e.id == id)?;
        let removed = self.child_node_entries.remove(pos);
        for entry in self.child_node_entries[pos..].iter_mut() {
            if entry.name == removed.name {
                entry.index -= 1;
            }
        }
        Some(removed)
    }

    pub fn child_node_entry(&self, name: &Name, index: u32) -> Option<&ChildNodeEntry> {
        self.child_node_entries
            .iter()
            .find(|e| &e.name == name && e.index == index)
    }
}

/// State of one property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyState {
    pub id: PropertyId,
    pub property_type: PropertyType,
    pub multi_valued: bool,
    pub values: Vec<InternalValue>,
    pub status: ItemStatus,
    pub mod_count: u16,
}

impl PropertyState {
    /// A blank state with status [`ItemStatus::New`] and no values.
    pub fn new(id: PropertyId) -> Self {
        Self {
            id,
            property_type: PropertyType::String,
            multi_valued: false,
            values: Vec::new(),
            status: ItemStatus::New,
            mod_count: 0,
        }
    }

    /// A single-valued property; the type is taken from the value.
    pub fn single(id: PropertyId, value: InternalValue) -> Self {
        Self {
            property_type: value.property_type(),
            values: vec![value],
            ..Self::new(id)
        }
    }

    /// A multi-valued property of the given type.
    pub fn multi(id: PropertyId, property_type: PropertyType, values: Vec<InternalValue>) -> Self {
        Self {
            property_type,
            multi_valued: true,
            values,
            ..Self::new(id)
        }
    }

    pub fn name(&self) -> &Name {
        self.id.name()
    }

    pub fn parent_id(&self) -> NodeId {
        self.id.parent_id()
    }
}

/// Either a node or a property state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ItemState {
    Node(NodeState),
    Property(PropertyState),
}

impl ItemState {
    pub fn id(&self) -> ItemId {
        match self {
            Self::Node(n) => ItemId::Node(n.id),
            Self::Property(p) => ItemId::Property(p.id.clone()),
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Self::Node(_))
    }

    /// Parent of the item: the owning node for a property, the parent node
    /// for a node (`None` for the root).
    pub fn parent_id(&self) -> Option<NodeId> {
        match self {
            Self::Node(n) => n.parent_id,
            Self::Property(p) => Some(p.parent_id()),
        }
    }

    /// Id of the node whose bundle stores this item.
    pub fn bundle_id(&self) -> NodeId {
        match self {
            Self::Node(n) => n.id,
            Self::Property(p) => p.parent_id(),
        }
    }

    pub fn status(&self) -> ItemStatus {
        match self {
            Self::Node(n) => n.status,
            Self::Property(p) => p.status,
        }
    }

    pub fn as_node(&self) -> Option<&NodeState> {
        match self {
            Self::Node(n) => Some(n),
            Self::Property(_) => None,
        }
    }

    pub fn as_property(&self) -> Option<&PropertyState> {
        match self {
            Self::Property(p) => Some(p),
            Self::Node(_) => None,
        }
    }
}

impl From<NodeState> for ItemState {
    fn from(state: NodeState) -> Self {
        Self::Node(state)
    }
}

impl From<PropertyState> for ItemState {
    fn from(state: PropertyState) -> Self {
        Self::Property(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::names;

    fn node(n: u128) -> NodeState {
        NodeState::new(NodeId::from_u128(n), names::nt_unstructured(), Some(NodeId::from_u128(0)))
    }

    #[test]
    fn new_node_state_carries_type_and_parent_only() {
        let parent = NodeId::from_u128(9);
        let state = NodeState::new(NodeId::from_u128(1), names::nt_unstructured(), Some(parent));
        assert_eq!(state.status, ItemStatus::New);
        assert_eq!(state.node_type_name, names::nt_unstructured());
        assert_eq!(state.parent_id, Some(parent));
        assert!(state.mixin_type_names.is_empty());
        assert!(state.child_node_entries.is_empty());
        assert!(state.property_names.is_empty());
    }

    #[test]
    fn same_name_siblings_are_indexed() {
        let mut parent = node(1);
        parent.add_child_node_entry(Name::new("", "item"), NodeId::from_u128(2));
        parent.add_child_node_entry(Name::new("", "other"), NodeId::from_u128(3));
        let index = parent.add_child_node_entry(Name::new("", "item"), NodeId::from_u128(4));
        assert_eq!(index, 2);
        assert_eq!(
            parent.child_node_entry(&Name::new("", "item"), 2).map(|e| e.id),
            Some(NodeId::from_u128(4))
        );
    }

    #[test]
    fn removing_child_renumbers_siblings() {
        let mut parent = node(1);
        parent.add_child_node_entry(Name::new("", "item"), NodeId::from_u128(2));
        parent.add_child_node_entry(Name::new("", "item"), NodeId::from_u128(3));
        parent.remove_child_node_entry(&NodeId::from_u128(2)).unwrap();
        assert_eq!(parent.child_node_entries.len(), 1);
        assert_eq!(parent.child_node_entries[0].index, 1);
        assert!(parent.remove_child_node_entry(&NodeId::from_u128(99)).is_none());
    }

    #[test]
    fn property_item_parent_is_owner() {
        let owner = NodeId::from_u128(5);
        let prop = PropertyState::single(
            PropertyId::new(owner, Name::new("", "title")),
            InternalValue::from("hello"),
        );
        let item = ItemState::from(prop);
        assert!(!item.is_node());
        assert_eq!(item.parent_id(), Some(owner));
        assert_eq!(item.bundle_id(), owner);
    }

    #[test]
    fn root_node_has_no_parent() {
        let root = NodeState::new(NodeId::from_u128(0), names::nt_unstructured(), None);
        let item = ItemState::from(root);
        assert_eq!(item.parent_id(), None);
        assert_eq!(item.bundle_id(), NodeId::from_u128(0));
    }

    #[test]
    fn single_value_takes_type_from_value() {
        let prop = PropertyState::single(
            PropertyId::new(NodeId::from_u128(1), Name::new("", "count")),
            InternalValue::Long(3),
        );
        assert_eq!(prop.property_type, PropertyType::Long);
        assert!(!prop.multi_valued);
    }
}
