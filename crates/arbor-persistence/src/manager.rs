//! The bundle persistence manager.
//!
//! [`BundlePersistenceManager::store`] turns a [`ChangeLog`] into bundle
//! mutations and backend writes in strictly ordered phases:
//!
//! 1. destroy the bundles of deleted nodes and cache them as missing
//! 2. build fresh bundles for added nodes
//! 3. apply modified nodes, then modified properties
//! 4. remove deleted properties (owners not deleted in step 1)
//! 5. add added properties
//! 6. warn about deleted nodes whose parent is untouched
//! 7. write every staged bundle back, refreshing only already cached ids
//! 8. store or destroy modified reference lists
//!
//! Any error clears the whole bundle cache before it is returned. Bundles
//! already written stay written; the next read simply reloads.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use arbor_bundle::NodePropBundle;
use arbor_cache::CacheStats;
use arbor_types::{
    names, ChangeLog, ItemId, NodeId, NodeReferences, NodeState, PropertyId, PropertyState,
};

use crate::backend::BundleBackend;
use crate::cache::BundleCache;
use crate::config::PersistenceConfig;
use crate::error::{PersistenceError, Result};

/// Bundles staged for write-back, keyed by node id.
type WorkingSet = BTreeMap<NodeId, NodePropBundle>;

/// Persistence manager storing each node with its properties as one bundle.
pub struct BundlePersistenceManager {
    backend: Arc<dyn BundleBackend>,
    cache: BundleCache,
    min_blob_size: usize,
    /// Held by `store` and `on_external_update`; reads never take it.
    writer: Mutex<()>,
}

impl std::fmt::Debug for BundlePersistenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundlePersistenceManager")
            .field("cache", &self.cache)
            .field("min_blob_size", &self.min_blob_size)
            .finish()
    }
}

impl BundlePersistenceManager {
    pub fn new(backend: Arc<dyn BundleBackend>, config: &PersistenceConfig) -> Result<Self> {
        config.validate()?;
        info!(
            cache_mb = config.bundle_cache_size_mb,
            shards = config.cache_shards,
            min_blob_size = config.min_blob_size,
            "bundle persistence manager ready"
        );
        Ok(Self {
            backend,
            cache: BundleCache::new(config.bundle_cache_bytes(), config.cache_shards),
            min_blob_size: config.min_blob_size,
            writer: Mutex::new(()),
        })
    }

    pub fn backend(&self) -> &dyn BundleBackend {
        self.backend.as_ref()
    }

    pub fn cache(&self) -> &BundleCache {
        &self.cache
    }

    // ---------------------------------------------------------------
    // Write path
    // ---------------------------------------------------------------

    /// Apply a change log. On failure the bundle cache is emptied.
    pub fn store(&self, changes: &ChangeLog) -> Result<()> {
        let _writer = self.writer.lock();
        match self.apply(changes) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.cache.clear();
                warn!(error = %e, "store failed, bundle cache cleared");
                Err(e)
            }
        }
    }

    fn apply(&self, changes: &ChangeLog) -> Result<()> {
        let blobs = self.backend.blob_store();
        let mut deleted: BTreeSet<NodeId> = BTreeSet::new();
        let mut staged = WorkingSet::new();

        for node in changes.deleted_nodes() {
            let bundle = self
                .cache
                .get(&node.id, self.backend())?
                .ok_or(PersistenceError::NotFound(ItemId::Node(node.id)))?;
            self.backend.destroy_bundle(&bundle)?;
            bundle.release_blobs(blobs);
            self.cache.put_missing(node.id);
            deleted.insert(node.id);
            debug!(node = %node.id, "bundle destroyed");
        }

        for node in changes.added_nodes() {
            staged.insert(node.id, NodePropBundle::new(node));
        }

        for node in changes.modified_states().filter_map(|s| s.as_node()) {
            self.stage(&mut staged, node.id)?.update(node);
        }
        for prop in changes.modified_states().filter_map(|s| s.as_property()) {
            if names::is_identity_property(prop.name()) {
                continue;
            }
            self.stage(&mut staged, prop.parent_id())?
                .add_property(prop, blobs, self.min_blob_size)?;
        }

        for prop in changes.deleted_properties() {
            if deleted.contains(&prop.parent_id()) {
                continue;
            }
            self.stage_owner(&mut staged, prop, "deleted property's owner not in change log")?
                .remove_property(prop.name(), blobs);
        }

        for prop in changes.added_properties() {
            if names::is_identity_property(prop.name()) {
                continue;
            }
            self.stage_owner(&mut staged, prop, "added property's owner not in change log")?
                .add_property(prop, blobs, self.min_blob_size)?;
        }

        for node in changes.deleted_nodes() {
            if let Some(parent) = node.parent_id {
                if !deleted.contains(&parent) && !staged.contains_key(&parent) {
                    warn!(node = %node.id, parent = %parent, "deleted node's parent not modified");
                }
            }
        }

        let written = staged.len();
        for mut bundle in staged.into_values() {
            self.backend.store_bundle(&bundle)?;
            bundle.mark_old();
            self.cache.refresh(&bundle);
        }

        for refs in changes.modified_refs() {
            if refs.has_references() {
                self.backend.store_references(refs)?;
            } else {
                self.backend.destroy_references(refs)?;
            }
        }

        debug!(
            deleted = deleted.len(),
            written,
            references = changes.modified_refs().count(),
            "change log applied"
        );
        Ok(())
    }

    /// The working-set bundle of `id`, pulling a private copy from the
    /// cache (or backend) on first use.
    fn stage<'a>(&self, staged: &'a mut WorkingSet, id: NodeId) -> Result<&'a mut NodePropBundle> {
        match staged.entry(id) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let bundle = self
                    .cache
                    .get(&id, self.backend())?
                    .ok_or(PersistenceError::NotFound(ItemId::Node(id)))?;
                Ok(e.insert(NodePropBundle::clone(&bundle)))
            }
        }
    }

    /// Like [`Self::stage`], but warns when the owner was not staged by an
    /// earlier phase.
    fn stage_owner<'a>(
        &self,
        staged: &'a mut WorkingSet,
        prop: &PropertyState,
        message: &'static str,
    ) -> Result<&'a mut NodePropBundle> {
        let owner = prop.parent_id();
        if !staged.contains_key(&owner) {
            warn!(property = %prop.id, node = %owner, "{message}");
        }
        self.stage(staged, owner)
    }

    /// Invalidate the cached bundle of every item touched by a change made
    /// elsewhere. Nothing is loaded.
    pub fn on_external_update(&self, changes: &ChangeLog) {
        let _writer = self.writer.lock();
        let mut invalidated = BTreeSet::new();
        for state in changes.all_states() {
            let id = state.bundle_id();
            if invalidated.insert(id) {
                self.cache.invalidate(&id);
            }
        }
        debug!(bundles = invalidated.len(), "external update applied to cache");
    }

    // ---------------------------------------------------------------
    // Read path
    // ---------------------------------------------------------------

    pub fn load_node(&self, id: &NodeId) -> Result<NodeState> {
        let bundle = self
            .cache
            .get(id, self.backend())?
            .ok_or(PersistenceError::NotFound(ItemId::Node(*id)))?;
        Ok(bundle.create_node_state())
    }

    pub fn exists_node(&self, id: &NodeId) -> Result<bool> {
        Ok(self.cache.get(id, self.backend())?.is_some())
    }

    /// Load a property. Identity properties are derived from the owning
    /// node's header.
    pub fn load_property(&self, id: &PropertyId) -> Result<PropertyState> {
        let not_found = || PersistenceError::NotFound(ItemId::Property(id.clone()));
        let bundle = self
            .cache
            .get(&id.parent_id(), self.backend())?
            .ok_or_else(not_found)?;
        if let Some(state) = bundle.create_property_state(id.name(), self.backend.blob_store())? {
            return Ok(state);
        }
        bundle.synthesize_property(id.name()).ok_or_else(not_found)
    }

    pub fn exists_property(&self, id: &PropertyId) -> Result<bool> {
        Ok(self
            .cache
            .get(&id.parent_id(), self.backend())?
            .is_some_and(|bundle| bundle.has_property(id.name())))
    }

    /// Reference lists are read straight from the backend.
    pub fn load_references(&self, target: &NodeId) -> Result<NodeReferences> {
        self.backend
            .load_references(target)?
            .ok_or(PersistenceError::NotFound(ItemId::Node(*target)))
    }

    pub fn exists_references(&self, target: &NodeId) -> Result<bool> {
        Ok(self.backend.load_references(target)?.is_some())
    }

    /// A blank, not yet persisted node state typed `nt:unstructured`.
    pub fn create_new_node(&self, id: NodeId) -> NodeState {
        NodeState::new(id, names::nt_unstructured(), None)
    }

    /// A blank, not yet persisted property state.
    pub fn create_new_property(&self, id: PropertyId) -> PropertyState {
        PropertyState::new(id)
    }

    // ---------------------------------------------------------------
    // Maintenance
    // ---------------------------------------------------------------

    pub fn evict_bundle(&self, id: &NodeId) {
        self.cache.invalidate(id);
    }

    /// Run the backend's consistency check. A fixing run empties the cache
    /// since repaired bundles may differ from cached ones. Holds the writer
    /// lock, so no `store` interleaves with a repair.
    pub fn check_consistency(&self, ids: &[NodeId], recursive: bool, fix: bool) -> Result<Vec<String>> {
        let _writer = self.writer.lock();
        let problems = self.backend.check_consistency(ids, recursive, fix)?;
        for problem in &problems {
            warn!(problem = %problem, "consistency check");
        }
        if fix {
            self.cache.clear();
        }
        Ok(problems)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop all cached bundles.
    pub fn close(&self) {
        let stats = self.cache.stats();
        self.cache.clear();
        info!(hits = stats.hits, misses = stats.misses, "bundle persistence manager closed");
    }
}
