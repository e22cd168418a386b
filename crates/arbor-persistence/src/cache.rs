//! Bundle cache with negative caching.
//!
//! Every id is in one of three states: not cached, cached with its bundle,
//! or cached as known-absent. A known-absent id never reaches the backend
//! again until it is invalidated.
//!
//! A read-through fill is dropped when a write for the same shard landed
//! while the backend load was in flight, so a reader can never cache a
//! result older than a completed write.

use std::sync::Arc;

use tracing::debug;

use arbor_bundle::{NodePropBundle, StorageResult};
use arbor_cache::{CacheStats, ConcurrentCache};
use arbor_types::NodeId;

use crate::backend::BundleBackend;

/// Weight charged for a known-absent marker.
pub const MISSING_WEIGHT: u64 = 16;

#[derive(Clone, Debug)]
enum CachedBundle {
    Present(Arc<NodePropBundle>),
    Missing,
}

/// Result of a cache-only lookup.
#[derive(Clone, Debug)]
pub enum CacheLookup {
    /// Nothing cached for this id.
    Unknown,
    /// The cached bundle.
    Present(Arc<NodePropBundle>),
    /// The id is known not to exist.
    Missing,
}

impl CacheLookup {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

/// Memory-bounded read-through cache of bundles keyed by node id.
#[derive(Debug)]
pub struct BundleCache {
    inner: ConcurrentCache<NodeId, CachedBundle>,
}

impl BundleCache {
    pub fn new(max_memory_size: u64, shards: usize) -> Self {
        Self {
            inner: ConcurrentCache::with_shards(max_memory_size, shards),
        }
    }

    /// What the cache knows about `id`, without touching any backend.
    pub fn lookup(&self, id: &NodeId) -> CacheLookup {
        match self.inner.get(id) {
            Some(CachedBundle::Present(bundle)) => CacheLookup::Present(bundle),
            Some(CachedBundle::Missing) => CacheLookup::Missing,
            None => CacheLookup::Unknown,
        }
    }

    /// Return the bundle of `id`, loading it from `backend` on a miss.
    /// The outcome of a load, positive or negative, is cached unless a
    /// write touched the cache while the load was running.
    pub fn get(
        &self,
        id: &NodeId,
        backend: &dyn BundleBackend,
    ) -> StorageResult<Option<Arc<NodePropBundle>>> {
        let generation = match self.lookup(id) {
            CacheLookup::Present(bundle) => return Ok(Some(bundle)),
            CacheLookup::Missing => return Ok(None),
            CacheLookup::Unknown => self.inner.generation(id),
        };
        match backend.load_bundle(id)? {
            Some(mut bundle) => {
                bundle.mark_old();
                let bundle = Arc::new(bundle);
                let weight = bundle.size() as u64;
                let cached = self.inner.put_if_unchanged(
                    *id,
                    CachedBundle::Present(Arc::clone(&bundle)),
                    weight,
                    generation,
                );
                debug!(node = %id, size = weight, cached, "bundle loaded");
                Ok(Some(bundle))
            }
            None => {
                let cached =
                    self.inner
                        .put_if_unchanged(*id, CachedBundle::Missing, MISSING_WEIGHT, generation);
                debug!(node = %id, cached, "bundle absent");
                Ok(None)
            }
        }
    }

    /// Cache a copy of `bundle`, replacing whatever was cached for its id.
    pub fn put(&self, bundle: &NodePropBundle) {
        let bundle = Arc::new(bundle.clone());
        let weight = bundle.size() as u64;
        self.inner
            .put(bundle.id(), CachedBundle::Present(bundle), weight);
    }

    /// Replace the cached entry for `bundle`'s id, positive or negative, with
    /// a copy of `bundle`. Leaves an uncached id uncached. Either way, fills
    /// for that id already in flight are discarded. Returns whether an entry
    /// was replaced.
    pub fn refresh(&self, bundle: &NodePropBundle) -> bool {
        let bundle = Arc::new(bundle.clone());
        let weight = bundle.size() as u64;
        self.inner
            .replace_if_present(bundle.id(), CachedBundle::Present(bundle), weight)
    }

    /// Record that `id` does not exist.
    pub fn put_missing(&self, id: NodeId) {
        self.inner.put(id, CachedBundle::Missing, MISSING_WEIGHT);
    }

    /// `true` if anything, bundle or absent marker, is cached for `id`.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.inner.contains_key(id)
    }

    /// Forget whatever is cached for `id`.
    pub fn invalidate(&self, id: &NodeId) {
        self.inner.remove(id);
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Weight charged for `id`, if cached.
    pub fn charged_weight(&self, id: &NodeId) -> Option<u64> {
        self.inner.weight_of(id)
    }

    pub fn memory_used(&self) -> u64 {
        self.inner.memory_used()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use arbor_bundle::BlobStore;
    use arbor_types::{names, NodeReferences, NodeState};

    fn bundle(id: u128) -> NodePropBundle {
        NodePropBundle::new(&NodeState::new(
            NodeId::from_u128(id),
            names::nt_unstructured(),
            None,
        ))
    }

    fn cache() -> BundleCache {
        BundleCache::new(1 << 20, 4)
    }

    #[test]
    fn miss_loads_and_caches() {
        let backend = InMemoryBackend::new();
        let b = bundle(1);
        backend.store_bundle(&b).unwrap();

        let cache = cache();
        assert!(cache.lookup(&b.id()).is_unknown());
        let loaded = cache.get(&b.id(), &backend).unwrap().unwrap();
        assert!(!loaded.is_new());
        assert!(matches!(cache.lookup(&b.id()), CacheLookup::Present(_)));
        assert_eq!(cache.charged_weight(&b.id()), Some(loaded.size() as u64));
    }

    #[test]
    fn absent_id_is_cached_as_missing() {
        let backend = InMemoryBackend::new();
        let cache = cache();
        let id = NodeId::from_u128(2);

        assert!(cache.get(&id, &backend).unwrap().is_none());
        assert!(matches!(cache.lookup(&id), CacheLookup::Missing));
        assert_eq!(cache.charged_weight(&id), Some(MISSING_WEIGHT));

        // a bundle appearing behind the cache's back stays invisible
        backend.store_bundle(&bundle(2)).unwrap();
        assert!(cache.get(&id, &backend).unwrap().is_none());

        cache.invalidate(&id);
        assert!(cache.get(&id, &backend).unwrap().is_some());
    }

    #[test]
    fn put_replaces_missing_marker() {
        let cache = cache();
        let b = bundle(3);
        cache.put_missing(b.id());
        cache.put(&b);
        assert!(matches!(cache.lookup(&b.id()), CacheLookup::Present(_)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn refresh_only_replaces_cached_ids() {
        let cache = cache();
        let b = bundle(7);
        assert!(!cache.refresh(&b));
        assert!(!cache.contains(&b.id()));

        cache.put_missing(b.id());
        assert!(cache.refresh(&b));
        assert!(matches!(cache.lookup(&b.id()), CacheLookup::Present(_)));
    }

    /// Backend that lets a write land while a load is in flight.
    struct WriteDuringLoad<'a> {
        inner: InMemoryBackend,
        cache: &'a BundleCache,
        pending: parking_lot::Mutex<Option<NodePropBundle>>,
    }

    impl BundleBackend for WriteDuringLoad<'_> {
        fn load_bundle(&self, id: &NodeId) -> StorageResult<Option<NodePropBundle>> {
            let loaded = self.inner.load_bundle(id)?;
            if let Some(bundle) = self.pending.lock().take() {
                self.inner.store_bundle(&bundle)?;
                self.cache.refresh(&bundle);
            }
            Ok(loaded)
        }
        fn store_bundle(&self, bundle: &NodePropBundle) -> StorageResult<()> {
            self.inner.store_bundle(bundle)
        }
        fn destroy_bundle(&self, bundle: &NodePropBundle) -> StorageResult<()> {
            self.inner.destroy_bundle(bundle)
        }
        fn load_references(&self, id: &NodeId) -> StorageResult<Option<NodeReferences>> {
            self.inner.load_references(id)
        }
        fn store_references(&self, refs: &NodeReferences) -> StorageResult<()> {
            self.inner.store_references(refs)
        }
        fn destroy_references(&self, refs: &NodeReferences) -> StorageResult<()> {
            self.inner.destroy_references(refs)
        }
        fn blob_store(&self) -> &dyn BlobStore {
            self.inner.blob_store()
        }
    }

    #[test]
    fn absent_result_is_not_cached_after_concurrent_write() {
        let cache = cache();
        let b = bundle(8);
        let backend = WriteDuringLoad {
            inner: InMemoryBackend::new(),
            cache: &cache,
            pending: parking_lot::Mutex::new(Some(b.clone())),
        };

        // this load saw the store before the write
        assert!(cache.get(&b.id(), &backend).unwrap().is_none());
        assert!(cache.lookup(&b.id()).is_unknown());
        assert!(cache.get(&b.id(), &backend).unwrap().is_some());
        assert!(matches!(cache.lookup(&b.id()), CacheLookup::Present(_)));
    }

    #[test]
    fn clear_forgets_everything() {
        let cache = cache();
        cache.put(&bundle(4));
        cache.put_missing(NodeId::from_u128(5));
        assert_eq!(cache.memory_used(), bundle(4).size() as u64 + MISSING_WEIGHT);
        cache.clear();
        assert!(cache.is_empty());
        assert!(!cache.contains(&NodeId::from_u128(5)));
    }

    #[test]
    fn cached_bundles_are_shared_snapshots() {
        let cache = cache();
        let mut b = bundle(6);
        cache.put(&b);
        b.mark_old();
        let CacheLookup::Present(cached) = cache.lookup(&b.id()) else {
            panic!("expected cached bundle");
        };
        assert!(cached.is_new());
    }
}
