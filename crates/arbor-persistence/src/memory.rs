use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;
use tracing::info;

use arbor_bundle::{codec, BlobStore, InMemoryBlobStore, NodePropBundle, StorageResult};
use arbor_types::{NodeId, NodeReferences};

use crate::backend::BundleBackend;

/// In-memory, HashMap-based backend.
///
/// Intended for tests and embedding. Bundles are kept as encoded records so
/// a loaded bundle never shares state with the one that was stored.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    bundles: RwLock<HashMap<NodeId, Vec<u8>>>,
    references: RwLock<HashMap<NodeId, NodeReferences>>,
    blobs: InMemoryBlobStore,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored bundles.
    pub fn bundle_count(&self) -> usize {
        self.bundles.read().len()
    }

    /// Number of stored reference lists.
    pub fn references_count(&self) -> usize {
        self.references.read().len()
    }

    pub fn contains_bundle(&self, id: &NodeId) -> bool {
        self.bundles.read().contains_key(id)
    }

    /// Sorted ids of all stored bundles.
    pub fn all_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.bundles.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn blobs(&self) -> &InMemoryBlobStore {
        &self.blobs
    }
}

impl BundleBackend for InMemoryBackend {
    fn load_bundle(&self, id: &NodeId) -> StorageResult<Option<NodePropBundle>> {
        let map = self.bundles.read();
        match map.get(id) {
            Some(bytes) => Ok(Some(codec::decode_bundle(bytes, &id.to_string())?)),
            None => Ok(None),
        }
    }

    fn store_bundle(&self, bundle: &NodePropBundle) -> StorageResult<()> {
        let bytes = codec::encode_bundle(bundle)?;
        self.bundles.write().insert(bundle.id(), bytes);
        Ok(())
    }

    fn destroy_bundle(&self, bundle: &NodePropBundle) -> StorageResult<()> {
        self.bundles.write().remove(&bundle.id());
        Ok(())
    }

    fn load_references(&self, id: &NodeId) -> StorageResult<Option<NodeReferences>> {
        Ok(self.references.read().get(id).cloned())
    }

    fn store_references(&self, refs: &NodeReferences) -> StorageResult<()> {
        self.references.write().insert(refs.target_id(), refs.clone());
        Ok(())
    }

    fn destroy_references(&self, refs: &NodeReferences) -> StorageResult<()> {
        self.references.write().remove(&refs.target_id());
        Ok(())
    }

    fn blob_store(&self) -> &dyn BlobStore {
        &self.blobs
    }

    fn check_consistency(
        &self,
        ids: &[NodeId],
        recursive: bool,
        fix: bool,
    ) -> StorageResult<Vec<String>> {
        let mut pending = if ids.is_empty() { self.all_ids() } else { ids.to_vec() };
        let mut seen = BTreeSet::new();
        let mut problems = Vec::new();

        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(bundle) = self.load_bundle(&id)? else {
                problems.push(format!("{id}: bundle missing"));
                continue;
            };
            let mut repaired = bundle.clone();
            let mut dirty = false;
            for child in bundle.child_node_entries() {
                if self.contains_bundle(&child.id) {
                    if recursive {
                        pending.push(child.id);
                    }
                    continue;
                }
                problems.push(format!("{id}: child {} ({}) missing", child.name, child.id));
                if fix {
                    dirty |= repaired.remove_child_entry(&child.id);
                }
            }
            if dirty {
                self.store_bundle(&repaired)?;
                info!(node = %id, "removed dangling child entries");
            }
        }
        Ok(problems)
    }
}
