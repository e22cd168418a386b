use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use arbor_types::{
    names, ChildNodeEntry, InternalValue, ItemStatus, Name, NodeId, NodeState, PropertyId,
    PropertyState, PropertyType,
};

use crate::blob::BlobStore;
use crate::error::StorageResult;

/// Fixed overhead charged for every bundle, regardless of content.
const BUNDLE_BASE_SIZE: usize = 520;

/// Overhead charged per property record.
const PROPERTY_BASE_SIZE: usize = 200;

/// Overhead charged per child entry on top of its name.
const CHILD_ENTRY_SIZE: usize = 64;

/// A stored property value: either kept in the bundle or moved to the blob
/// store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BundleValue {
    Inline(InternalValue),
    Blob { id: String, length: u64 },
}

impl BundleValue {
    fn memory_size(&self) -> usize {
        match self {
            Self::Inline(v) => v.memory_size(),
            Self::Blob { id, .. } => id.len() + 16,
        }
    }
}

/// One property record inside a bundle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntry {
    id: PropertyId,
    property_type: PropertyType,
    multi_valued: bool,
    mod_count: u16,
    values: Vec<BundleValue>,
}

impl PropertyEntry {
    /// Build a record from a property state, moving binary values larger
    /// than `min_blob_size` bytes into `blobs`.
    pub fn from_state(
        state: &PropertyState,
        blobs: &dyn BlobStore,
        min_blob_size: usize,
    ) -> StorageResult<Self> {
        let mut values = Vec::with_capacity(state.values.len());
        for (index, value) in state.values.iter().enumerate() {
            match value.as_binary() {
                Some(data) if data.len() > min_blob_size => {
                    let id = blobs.create_id(&state.id, index)?;
                    blobs.put(&id, data)?;
                    values.push(BundleValue::Blob {
                        id,
                        length: data.len() as u64,
                    });
                }
                _ => values.push(BundleValue::Inline(value.clone())),
            }
        }
        Ok(Self {
            id: state.id.clone(),
            property_type: state.property_type,
            multi_valued: state.multi_valued,
            mod_count: state.mod_count,
            values,
        })
    }

    /// Rebuild the property state, reading externalized values back.
    pub fn to_state(&self, blobs: &dyn BlobStore) -> StorageResult<PropertyState> {
        let mut values = Vec::with_capacity(self.values.len());
        for value in &self.values {
            values.push(match value {
                BundleValue::Inline(v) => v.clone(),
                BundleValue::Blob { id, .. } => InternalValue::Binary(blobs.get(id)?),
            });
        }
        Ok(PropertyState {
            id: self.id.clone(),
            property_type: self.property_type,
            multi_valued: self.multi_valued,
            values,
            status: ItemStatus::Existing,
            mod_count: self.mod_count,
        })
    }

    /// Release every externalized value. Failures are logged, not raised.
    pub fn destroy(&self, blobs: &dyn BlobStore) {
        for blob_id in self.blob_ids() {
            if let Err(e) = blobs.remove(blob_id) {
                warn!(property = %self.id, blob = blob_id, error = %e, "failed to release blob");
            }
        }
    }

    pub fn id(&self) -> &PropertyId {
        &self.id
    }

    pub fn property_type(&self) -> PropertyType {
        self.property_type
    }

    pub fn is_multi_valued(&self) -> bool {
        self.multi_valued
    }

    pub fn values(&self) -> &[BundleValue] {
        &self.values
    }

    /// Ids of the values living in the blob store.
    pub fn blob_ids(&self) -> impl Iterator<Item = &str> {
        self.values.iter().filter_map(|v| match v {
            BundleValue::Blob { id, .. } => Some(id.as_str()),
            BundleValue::Inline(_) => None,
        })
    }

    fn memory_size(&self) -> usize {
        PROPERTY_BASE_SIZE
            + self.id.name().memory_size()
            + self.values.iter().map(BundleValue::memory_size).sum::<usize>()
    }
}

/// The durable record of one node and all its properties.
///
/// Loaded bundles are shared read-only through the cache; mutation happens
/// on a private clone during a store. The only interior mutability is the
/// table of synthesized identity property states, which is never persisted.
#[derive(Debug, Serialize, Deserialize)]
pub struct NodePropBundle {
    id: NodeId,
    parent_id: Option<NodeId>,
    node_type_name: Name,
    mixin_type_names: BTreeSet<Name>,
    child_node_entries: Vec<ChildNodeEntry>,
    properties: BTreeMap<Name, PropertyEntry>,
    #[serde(skip)]
    is_new: bool,
    #[serde(skip)]
    synthesized: Mutex<BTreeMap<Name, PropertyState>>,
}

impl Clone for NodePropBundle {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            parent_id: self.parent_id,
            node_type_name: self.node_type_name.clone(),
            mixin_type_names: self.mixin_type_names.clone(),
            child_node_entries: self.child_node_entries.clone(),
            properties: self.properties.clone(),
            is_new: self.is_new,
            synthesized: Mutex::new(self.synthesized.lock().clone()),
        }
    }
}

impl NodePropBundle {
    /// A fresh, dirty bundle for a newly added node.
    pub fn new(state: &NodeState) -> Self {
        Self {
            id: state.id,
            parent_id: state.parent_id,
            node_type_name: state.node_type_name.clone(),
            mixin_type_names: state.mixin_type_names.clone(),
            child_node_entries: state.child_node_entries.clone(),
            properties: BTreeMap::new(),
            is_new: true,
            synthesized: Mutex::new(BTreeMap::new()),
        }
    }

    /// Copy the node-level fields of `state` into the bundle.
    pub fn update(&mut self, state: &NodeState) {
        self.parent_id = state.parent_id;
        self.node_type_name = state.node_type_name.clone();
        self.mixin_type_names = state.mixin_type_names.clone();
        self.child_node_entries = state.child_node_entries.clone();
        self.synthesized.get_mut().clear();
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent_id
    }

    pub fn node_type_name(&self) -> &Name {
        &self.node_type_name
    }

    pub fn mixin_type_names(&self) -> &BTreeSet<Name> {
        &self.mixin_type_names
    }

    pub fn child_node_entries(&self) -> &[ChildNodeEntry] {
        &self.child_node_entries
    }

    /// Drop the child entry pointing at `id`. Returns `true` if one existed.
    pub fn remove_child_entry(&mut self, id: &NodeId) -> bool {
        let before = self.child_node_entries.len();
        self.child_node_entries.retain(|e| e.id != *id);
        self.child_node_entries.len() != before
    }

    /// `true` until the bundle has been written to or read from storage.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Mark the bundle as in sync with storage.
    pub fn mark_old(&mut self) {
        self.is_new = false;
    }

    pub fn is_referenceable(&self) -> bool {
        self.mixin_type_names.contains(&names::mix_referenceable())
    }

    // ---------------------------------------------------------------
    // Properties
    // ---------------------------------------------------------------

    /// Insert or replace the record for `state`, releasing the blobs of a
    /// replaced record first. Identity properties are never stored.
    pub fn add_property(
        &mut self,
        state: &PropertyState,
        blobs: &dyn BlobStore,
        min_blob_size: usize,
    ) -> StorageResult<()> {
        let name = state.name();
        if names::is_identity_property(name) {
            debug!(property = %state.id, "identity property not stored in bundle");
            return Ok(());
        }
        if let Some(old) = self.properties.remove(name) {
            old.destroy(blobs);
        }
        let entry = PropertyEntry::from_state(state, blobs, min_blob_size)?;
        self.properties.insert(name.clone(), entry);
        Ok(())
    }

    /// Remove a property record and release its blobs.
    pub fn remove_property(&mut self, name: &Name, blobs: &dyn BlobStore) -> Option<PropertyEntry> {
        let entry = self.properties.remove(name)?;
        entry.destroy(blobs);
        Some(entry)
    }

    /// Remove every property record, releasing all blobs.
    pub fn remove_all_properties(&mut self, blobs: &dyn BlobStore) {
        for (_, entry) in std::mem::take(&mut self.properties) {
            entry.destroy(blobs);
        }
        self.synthesized.get_mut().clear();
    }

    /// Release the blobs of every property while leaving the records in
    /// place. Used when the whole bundle is destroyed.
    pub fn release_blobs(&self, blobs: &dyn BlobStore) {
        for entry in self.properties.values() {
            entry.destroy(blobs);
        }
    }

    /// Whether the node has the named property, counting identity
    /// properties that apply to this node.
    pub fn has_property(&self, name: &Name) -> bool {
        if self.properties.contains_key(name) {
            return true;
        }
        if *name == names::jcr_primary_type() {
            true
        } else if *name == names::jcr_mixin_types() {
            !self.mixin_type_names.is_empty()
        } else if *name == names::jcr_uuid() {
            self.is_referenceable()
        } else {
            false
        }
    }

    pub fn property_entry(&self, name: &Name) -> Option<&PropertyEntry> {
        self.properties.get(name)
    }

    /// Names of stored property records (identity properties excluded).
    pub fn property_names(&self) -> impl Iterator<Item = &Name> {
        self.properties.keys()
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Every externalized blob id referenced by this bundle.
    pub fn blob_ids(&self) -> Vec<String> {
        self.properties
            .values()
            .flat_map(|e| e.blob_ids().map(str::to_string))
            .collect()
    }

    // ---------------------------------------------------------------
    // State conversion
    // ---------------------------------------------------------------

    /// Build the node state described by this bundle.
    pub fn create_node_state(&self) -> NodeState {
        let mut property_names: BTreeSet<Name> = self.properties.keys().cloned().collect();
        property_names.insert(names::jcr_primary_type());
        if !self.mixin_type_names.is_empty() {
            property_names.insert(names::jcr_mixin_types());
        }
        if self.is_referenceable() {
            property_names.insert(names::jcr_uuid());
        }
        NodeState {
            id: self.id,
            parent_id: self.parent_id,
            node_type_name: self.node_type_name.clone(),
            mixin_type_names: self.mixin_type_names.clone(),
            child_node_entries: self.child_node_entries.clone(),
            property_names,
            status: ItemStatus::Existing,
        }
    }

    /// Build the state of a stored or previously synthesized property.
    /// Returns `Ok(None)` if neither exists.
    pub fn create_property_state(
        &self,
        name: &Name,
        blobs: &dyn BlobStore,
    ) -> StorageResult<Option<PropertyState>> {
        if let Some(entry) = self.properties.get(name) {
            return entry.to_state(blobs).map(Some);
        }
        Ok(self.synthesized.lock().get(name).cloned())
    }

    /// Derive one of the identity properties from the header fields and
    /// register it so later reads reuse it. Returns `None` for any other
    /// name.
    pub fn synthesize_property(&self, name: &Name) -> Option<PropertyState> {
        let id = PropertyId::new(self.id, name.clone());
        let state = if *name == names::jcr_uuid() {
            PropertyState::single(id, InternalValue::String(self.id.to_string()))
        } else if *name == names::jcr_primary_type() {
            PropertyState::single(id, InternalValue::Name(self.node_type_name.clone()))
        } else if *name == names::jcr_mixin_types() {
            let values = self
                .mixin_type_names
                .iter()
                .cloned()
                .map(InternalValue::Name)
                .collect();
            PropertyState::multi(id, PropertyType::Name, values)
        } else {
            return None;
        };
        self.synthesized
            .lock()
            .insert(name.clone(), state.clone());
        Some(state)
    }

    /// Estimated in-memory footprint, used as the cache weight.
    pub fn size(&self) -> usize {
        BUNDLE_BASE_SIZE
            + self.node_type_name.memory_size()
            + self
                .mixin_type_names
                .iter()
                .map(Name::memory_size)
                .sum::<usize>()
            + self
                .child_node_entries
                .iter()
                .map(|e| e.name.memory_size() + CHILD_ENTRY_SIZE)
                .sum::<usize>()
            + self
                .properties
                .values()
                .map(PropertyEntry::memory_size)
                .sum::<usize>()
    }
}
