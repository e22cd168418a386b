//! Memory-bounded concurrent cache.
//!
//! [`ConcurrentCache`] charges every entry a caller-supplied weight and
//! keeps the total under a configured memory budget by evicting the least
//! recently used entries. Keys are spread over independently locked shards
//! so readers on different keys rarely contend.

pub mod concurrent;

pub use concurrent::{CacheStats, ConcurrentCache, DEFAULT_SHARDS};
