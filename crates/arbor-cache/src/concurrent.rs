//! Sharded, weight-bounded LRU cache.
//!
//! Keys hash to one of several independently locked shards. The memory
//! budget is global: after an insert pushes the total charged weight past
//! the budget, entries are evicted oldest-first across all shards until the
//! total fits again.
//!
//! Each shard also carries a generation number. Writers bump it through
//! [`ConcurrentCache::put`], [`ConcurrentCache::remove`],
//! [`ConcurrentCache::replace_if_present`] and [`ConcurrentCache::clear`].
//! A reader that fills the cache from slower storage records the generation
//! first and inserts with [`ConcurrentCache::put_if_unchanged`], so a fill
//! that raced a writer is dropped instead of caching a stale value.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Point-in-time cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub memory_used: u64,
    pub max_memory_size: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Slot<V> {
    value: V,
    weight: u64,
    /// Global access tick; lower means less recently used.
    tick: u64,
}

struct Shard<K: Hash + Eq, V> {
    entries: LruCache<K, Slot<V>>,
    generation: u64,
}

/// Thread-safe LRU cache bounded by total entry weight.
///
/// An entry heavier than the whole budget is never cached. All operations
/// take `&self`.
pub struct ConcurrentCache<K: Hash + Eq, V> {
    shards: Box<[Mutex<Shard<K, V>>]>,
    hasher: RandomState,
    max_memory_size: AtomicU64,
    used: AtomicU64,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K: Hash + Eq, V: Clone> ConcurrentCache<K, V> {
    /// Create a cache with the given budget and [`DEFAULT_SHARDS`] shards.
    pub fn new(max_memory_size: u64) -> Self {
        Self::with_shards(max_memory_size, DEFAULT_SHARDS)
    }

    /// Create a cache with an explicit shard count (at least one).
    pub fn with_shards(max_memory_size: u64, shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| {
                Mutex::new(Shard {
                    entries: LruCache::unbounded(),
                    generation: 0,
                })
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            hasher: RandomState::new(),
            max_memory_size: AtomicU64::new(max_memory_size),
            used: AtomicU64::new(0),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn shard(&self, key: &K) -> &Mutex<Shard<K, V>> {
        let idx = (self.hasher.hash_one(key) % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let tick = self.tick();
        let mut shard = self.shard(key).lock();
        match shard.entries.get_mut(key) {
            Some(slot) => {
                slot.tick = tick;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(slot.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Returns `true` if `key` is cached. Does not affect recency.
    pub fn contains_key(&self, key: &K) -> bool {
        self.shard(key).lock().entries.contains(key)
    }

    /// Weight charged for `key`, if cached.
    pub fn weight_of(&self, key: &K) -> Option<u64> {
        self.shard(key).lock().entries.peek(key).map(|slot| slot.weight)
    }

    /// Generation of the shard holding `key`.
    pub fn generation(&self, key: &K) -> u64 {
        self.shard(key).lock().generation
    }

    /// Insert or replace `key`, charging `weight` against the budget.
    pub fn put(&self, key: K, value: V, weight: u64) {
        {
            let mut shard = self.shard(&key).lock();
            shard.generation += 1;
            self.insert_locked(&mut shard, key, value, weight);
        }
        self.shrink();
    }

    /// Insert `key` only if its shard's generation still equals
    /// `generation`. Does not bump the generation. Returns whether the entry
    /// was inserted.
    pub fn put_if_unchanged(&self, key: K, value: V, weight: u64, generation: u64) -> bool {
        {
            let mut shard = self.shard(&key).lock();
            if shard.generation != generation {
                return false;
            }
            if !self.insert_locked(&mut shard, key, value, weight) {
                return false;
            }
        }
        self.shrink();
        true
    }

    /// Replace `key` if it is cached, leaving it absent otherwise. Always
    /// bumps the generation. Returns whether an entry was replaced.
    pub fn replace_if_present(&self, key: K, value: V, weight: u64) -> bool {
        let replaced = {
            let mut shard = self.shard(&key).lock();
            shard.generation += 1;
            shard.entries.contains(&key) && self.insert_locked(&mut shard, key, value, weight)
        };
        if replaced {
            self.shrink();
        }
        replaced
    }

    /// Returns `false` when the entry is too heavy to cache; any previous
    /// value for the key is dropped in that case.
    fn insert_locked(&self, shard: &mut Shard<K, V>, key: K, value: V, weight: u64) -> bool {
        if weight > self.max_memory_size() {
            if let Some(old) = shard.entries.pop(&key) {
                self.used.fetch_sub(old.weight, Ordering::Relaxed);
            }
            trace!(weight, "entry exceeds cache budget, not cached");
            return false;
        }
        let slot = Slot { value, weight, tick: self.tick() };
        if let Some(old) = shard.entries.put(key, slot) {
            self.used.fetch_sub(old.weight, Ordering::Relaxed);
        }
        self.used.fetch_add(weight, Ordering::Relaxed);
        true
    }

    /// Evict the globally least recently used entry until within budget.
    fn shrink(&self) {
        let max = self.max_memory_size();
        let mut evicted = 0u64;
        while self.used.load(Ordering::Relaxed) > max {
            let mut victim: Option<(usize, u64)> = None;
            for (idx, shard) in self.shards.iter().enumerate() {
                if let Some((_, slot)) = shard.lock().entries.peek_lru() {
                    if victim.map_or(true, |(_, tick)| slot.tick < tick) {
                        victim = Some((idx, slot.tick));
                    }
                }
            }
            let Some((idx, tick)) = victim else { break };
            let mut shard = self.shards[idx].lock();
            // The oldest entry may have been touched since the scan.
            if shard.entries.peek_lru().map(|(_, slot)| slot.tick) != Some(tick) {
                continue;
            }
            if let Some((_, slot)) = shard.entries.pop_lru() {
                self.used.fetch_sub(slot.weight, Ordering::Relaxed);
                evicted += 1;
            }
        }
        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            trace!(evicted, used = self.used.load(Ordering::Relaxed), max, "cache shrunk");
        }
    }

    /// Remove `key`, returning its value if it was cached. Always bumps the
    /// generation.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut shard = self.shard(key).lock();
        shard.generation += 1;
        let slot = shard.entries.pop(key)?;
        self.used.fetch_sub(slot.weight, Ordering::Relaxed);
        Some(slot.value)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            shard.generation += 1;
            let released: u64 = shard.entries.iter().map(|(_, slot)| slot.weight).sum();
            shard.entries.clear();
            self.used.fetch_sub(released, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of the weights of all cached entries.
    pub fn memory_used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    pub fn max_memory_size(&self) -> u64 {
        self.max_memory_size.load(Ordering::Relaxed)
    }

    /// Change the budget, evicting immediately if now over it.
    pub fn set_max_memory_size(&self, max_memory_size: u64) {
        self.max_memory_size.store(max_memory_size, Ordering::Relaxed);
        self.shrink();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            memory_used: self.memory_used(),
            max_memory_size: self.max_memory_size(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl<K: Hash + Eq, V> std::fmt::Debug for ConcurrentCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentCache")
            .field("shards", &self.shards.len())
            .field("max_memory_size", &self.max_memory_size.load(Ordering::Relaxed))
            .field("used", &self.used.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn single_shard(max: u64) -> ConcurrentCache<u32, String> {
        ConcurrentCache::with_shards(max, 1)
    }

    fn shard_weight_sum<K: Hash + Eq, V>(cache: &ConcurrentCache<K, V>) -> u64 {
        cache
            .shards
            .iter()
            .map(|s| s.lock().entries.iter().map(|(_, slot)| slot.weight).sum::<u64>())
            .sum()
    }

    // -----------------------------------------------------------------------
    // Basic operations
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get() {
        let cache = single_shard(1000);
        cache.put(1, "one".into(), 10);
        assert_eq!(cache.get(&1).as_deref(), Some("one"));
        assert_eq!(cache.get(&2), None);
        assert_eq!(cache.memory_used(), 10);
    }

    #[test]
    fn replace_updates_weight() {
        let cache = single_shard(1000);
        cache.put(1, "a".into(), 10);
        cache.put(1, "b".into(), 30);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_used(), 30);
        assert_eq!(cache.weight_of(&1), Some(30));
    }

    #[test]
    fn remove_releases_weight() {
        let cache = single_shard(1000);
        cache.put(1, "a".into(), 10);
        assert_eq!(cache.remove(&1).as_deref(), Some("a"));
        assert_eq!(cache.remove(&1), None);
        assert_eq!(cache.memory_used(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_empties_every_shard() {
        let cache: ConcurrentCache<u32, u32> = ConcurrentCache::new(1 << 20);
        for i in 0..100 {
            cache.put(i, i, 8);
        }
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.memory_used(), 0);
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    #[test]
    fn evicts_least_recently_used() {
        let cache = single_shard(30);
        cache.put(1, "a".into(), 10);
        cache.put(2, "b".into(), 10);
        cache.put(3, "c".into(), 10);
        // touch 1 so 2 becomes the oldest
        cache.get(&1);
        cache.put(4, "d".into(), 10);

        assert!(cache.contains_key(&1));
        assert!(!cache.contains_key(&2));
        assert!(cache.contains_key(&3));
        assert!(cache.contains_key(&4));
        assert_eq!(cache.memory_used(), 30);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn oversized_entry_is_not_cached() {
        let cache = single_shard(10);
        cache.put(1, "a".into(), 5);
        cache.put(2, "huge".into(), 100);
        assert!(cache.contains_key(&1));
        assert!(!cache.contains_key(&2));
        assert_eq!(cache.memory_used(), 5);

        // replacing with an oversized value drops the old one
        cache.put(1, "huge".into(), 11);
        assert!(!cache.contains_key(&1));
        assert_eq!(cache.memory_used(), 0);
    }

    #[test]
    fn contains_does_not_promote() {
        let cache = single_shard(20);
        cache.put(1, "a".into(), 10);
        cache.put(2, "b".into(), 10);
        assert!(cache.contains_key(&1));
        cache.put(3, "c".into(), 10);
        assert!(!cache.contains_key(&1));
    }

    #[test]
    fn shrinking_budget_evicts() {
        let cache = single_shard(100);
        for i in 0..10 {
            cache.put(i, i.to_string(), 10);
        }
        cache.set_max_memory_size(40);
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.memory_used(), 40);
        assert_eq!(cache.max_memory_size(), 40);
        for i in 6..10 {
            assert!(cache.contains_key(&i));
        }
    }

    #[test]
    fn budget_holds_across_shards() {
        let cache: ConcurrentCache<u32, u32> = ConcurrentCache::with_shards(100, 4);
        for i in 0..64 {
            cache.put(i, i, 60);
            assert!(cache.memory_used() <= 100);
        }
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key(&63));
        assert_eq!(cache.memory_used(), shard_weight_sum(&cache));
    }

    #[test]
    fn entries_within_budget_survive_any_shard_layout() {
        let cache: ConcurrentCache<u32, u32> = ConcurrentCache::with_shards(100, 16);
        for i in 0..8 {
            cache.put(i, i, 30);
            assert!(cache.memory_used() <= 100);
        }
        // three entries of 30 fit in 100, wherever they hash
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.memory_used(), 90);
        for i in 5..8 {
            assert!(cache.contains_key(&i));
        }
    }

    #[test]
    fn eviction_order_is_global() {
        let cache: ConcurrentCache<u32, u32> = ConcurrentCache::with_shards(50, 8);
        for i in 0..5 {
            cache.put(i, i, 10);
        }
        cache.get(&0);
        cache.put(5, 5, 10);
        assert!(cache.contains_key(&0));
        assert!(!cache.contains_key(&1));
        assert_eq!(cache.len(), 5);
    }

    // -----------------------------------------------------------------------
    // Generations
    // -----------------------------------------------------------------------

    #[test]
    fn fill_is_dropped_after_a_write() {
        let cache = single_shard(100);
        let generation = cache.generation(&1);
        cache.remove(&1);
        assert!(!cache.put_if_unchanged(1, "stale".into(), 1, generation));
        assert!(!cache.contains_key(&1));

        let generation = cache.generation(&1);
        assert!(cache.put_if_unchanged(1, "fresh".into(), 1, generation));
        assert_eq!(cache.get(&1).as_deref(), Some("fresh"));
        // a fill does not invalidate other fills
        assert_eq!(cache.generation(&1), generation);
    }

    #[test]
    fn replace_if_present_bumps_even_when_absent() {
        let cache = single_shard(100);
        let generation = cache.generation(&7);
        assert!(!cache.replace_if_present(7, "new".into(), 1));
        assert!(!cache.contains_key(&7));
        assert!(!cache.put_if_unchanged(7, "stale".into(), 1, generation));

        cache.put(7, "old".into(), 1);
        assert!(cache.replace_if_present(7, "new".into(), 2));
        assert_eq!(cache.get(&7).as_deref(), Some("new"));
        assert_eq!(cache.memory_used(), 2);
    }

    #[test]
    fn clear_bumps_every_shard() {
        let cache: ConcurrentCache<u32, u32> = ConcurrentCache::with_shards(100, 4);
        let before: Vec<u64> = (0..16).map(|k| cache.generation(&k)).collect();
        cache.clear();
        for (k, generation) in before.into_iter().enumerate() {
            assert!(cache.generation(&(k as u32)) > generation);
        }
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    #[test]
    fn hit_and_miss_counters() {
        let cache = single_shard(100);
        cache.put(1, "a".into(), 1);
        cache.get(&1);
        cache.get(&1);
        cache.get(&2);
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    // -----------------------------------------------------------------------
    // Concurrency
    // -----------------------------------------------------------------------

    #[test]
    fn concurrent_access_is_safe() {
        let cache: Arc<ConcurrentCache<u32, u32>> = Arc::new(ConcurrentCache::new(1 << 16));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..500 {
                        let key = (t * 1000 + i) % 257;
                        cache.put(key, i, 4);
                        cache.get(&key);
                        if i % 7 == 0 {
                            cache.remove(&key);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert!(cache.memory_used() <= 1 << 16);
        assert_eq!(cache.memory_used(), cache.len() as u64 * 4);
    }

    #[test]
    fn concurrent_puts_respect_a_tight_budget() {
        let cache: Arc<ConcurrentCache<u32, u32>> = Arc::new(ConcurrentCache::with_shards(200, 8));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..400 {
                        cache.put(t * 1000 + i, i, 25);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert!(cache.memory_used() <= 200);
        assert_eq!(cache.memory_used(), shard_weight_sum(&cache));
    }
}
