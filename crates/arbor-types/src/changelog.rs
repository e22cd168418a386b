use crate::references::NodeReferences;
use crate::state::{ItemState, NodeState, PropertyState};

/// An atomic batch of item changes submitted for persistence in one call.
///
/// The four collections are disjoint: an item appears in at most one of
/// added, modified and deleted. The persistence layer only reads a change
/// log; the session layer builds and owns it.
#[derive(Clone, Debug, Default)]
pub struct ChangeLog {
    added: Vec<ItemState>,
    modified: Vec<ItemState>,
    deleted: Vec<ItemState>,
    modified_refs: Vec<NodeReferences>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn added(&mut self, state: impl Into<ItemState>) -> &mut Self {
        self.added.push(state.into());
        self
    }

    pub fn modified(&mut self, state: impl Into<ItemState>) -> &mut Self {
        self.modified.push(state.into());
        self
    }

    pub fn deleted(&mut self, state: impl Into<ItemState>) -> &mut Self {
        self.deleted.push(state.into());
        self
    }

    pub fn modified_references(&mut self, refs: NodeReferences) -> &mut Self {
        self.modified_refs.push(refs);
        self
    }

    pub fn added_states(&self) -> impl Iterator<Item = &ItemState> {
        self.added.iter()
    }

    pub fn modified_states(&self) -> impl Iterator<Item = &ItemState> {
        self.modified.iter()
    }

    pub fn deleted_states(&self) -> impl Iterator<Item = &ItemState> {
        self.deleted.iter()
    }

    pub fn modified_refs(&self) -> impl Iterator<Item = &NodeReferences> {
        self.modified_refs.iter()
    }

    /// Every added, modified and deleted state, in that order.
    pub fn all_states(&self) -> impl Iterator<Item = &ItemState> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .chain(self.deleted.iter())
    }

    pub fn added_nodes(&self) -> impl Iterator<Item = &NodeState> {
        self.added.iter().filter_map(ItemState::as_node)
    }

    pub fn added_properties(&self) -> impl Iterator<Item = &PropertyState> {
        self.added.iter().filter_map(ItemState::as_property)
    }

    pub fn deleted_nodes(&self) -> impl Iterator<Item = &NodeState> {
        self.deleted.iter().filter_map(ItemState::as_node)
    }

    pub fn deleted_properties(&self) -> impl Iterator<Item = &PropertyState> {
        self.deleted.iter().filter_map(ItemState::as_property)
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.deleted.is_empty()
            && self.modified_refs.is_empty()
    }
}
