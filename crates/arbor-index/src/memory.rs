//! Volatile string index.
//!
//! [`InMemoryStringIndex`] keeps its mapping in a `HashMap` behind a
//! `RwLock`. Besides tests it doubles as the namespace registry the
//! namespace index falls back to when no persisted override exists.

use std::collections::HashMap;

use parking_lot::RwLock;

use arbor_types::namespaces;

use crate::error::IndexResult;
use crate::traits::StringIndex;

/// Forward and reverse tables shared by the in-memory and file indices.
#[derive(Debug, Default)]
pub(crate) struct Interner {
    by_string: HashMap<String, u32>,
    by_index: Vec<String>,
}

impl Interner {
    pub(crate) fn get(&self, s: &str) -> Option<u32> {
        self.by_string.get(s).copied()
    }

    /// Insert `s` with the next free index. The caller has checked `get`.
    pub(crate) fn push(&mut self, s: &str) -> u32 {
        let index = self.by_index.len() as u32;
        self.by_index.push(s.to_string());
        self.by_string.insert(s.to_string(), index);
        index
    }

    /// Undo the most recent `push`.
    pub(crate) fn pop(&mut self) {
        if let Some(s) = self.by_index.pop() {
            self.by_string.remove(&s);
        }
    }

    pub(crate) fn lookup(&self, index: u32) -> Option<&str> {
        self.by_index.get(index as usize).map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.by_index.len()
    }

    pub(crate) fn entries(&self) -> Vec<(String, u32)> {
        self.by_index
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i as u32))
            .collect()
    }

    /// Rebuild from `(string, index)` pairs; indices must be dense from 0.
    pub(crate) fn from_pairs(mut pairs: Vec<(String, u32)>) -> Result<Self, String> {
        pairs.sort_by_key(|(_, i)| *i);
        let mut interner = Self::default();
        for (expected, (s, index)) in pairs.into_iter().enumerate() {
            if index as usize != expected {
                return Err(format!("index {index} out of sequence, expected {expected}"));
            }
            if interner.by_string.contains_key(&s) {
                return Err(format!("string {s:?} mapped twice"));
            }
            interner.push(&s);
        }
        Ok(interner)
    }
}

/// An in-memory implementation of [`StringIndex`]. Data is lost on drop.
#[derive(Debug, Default)]
pub struct InMemoryStringIndex {
    inner: RwLock<Interner>,
}

impl InMemoryStringIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// An index pre-seeded with the built-in namespace URIs, standing in
    /// for the repository's namespace registry.
    pub fn namespace_registry() -> Self {
        let index = Self::new();
        {
            let mut inner = index.inner.write();
            for (_, uri) in namespaces::BUILTIN {
                if inner.get(uri).is_none() {
                    inner.push(uri);
                }
            }
        }
        index
    }
}

impl StringIndex for InMemoryStringIndex {
    fn string_to_index(&self, s: &str) -> IndexResult<u32> {
        if let Some(index) = self.inner.read().get(s) {
            return Ok(index);
        }
        let mut inner = self.inner.write();
        Ok(match inner.get(s) {
            Some(index) => index,
            None => inner.push(s),
        })
    }

    fn index_to_string(&self, index: u32) -> Option<String> {
        self.inner.read().lookup(index).map(str::to_string)
    }

    fn len(&self) -> usize {
        self.inner.read().len()
    }

    fn entries(&self) -> Vec<(String, u32)> {
        self.inner.read().entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_string_same_index() {
        let index = InMemoryStringIndex::new();
        let a = index.string_to_index("title").unwrap();
        let b = index.string_to_index("body").unwrap();
        assert_ne!(a, b);
        assert_eq!(index.string_to_index("title").unwrap(), a);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn indices_are_dense_from_zero() {
        let index = InMemoryStringIndex::new();
        assert_eq!(index.string_to_index("a").unwrap(), 0);
        assert_eq!(index.string_to_index("b").unwrap(), 1);
        assert_eq!(index.string_to_index("c").unwrap(), 2);
    }

    #[test]
    fn reverse_lookup() {
        let index = InMemoryStringIndex::new();
        let i = index.string_to_index("content").unwrap();
        assert_eq!(index.index_to_string(i).as_deref(), Some("content"));
        assert_eq!(index.index_to_string(99), None);
    }

    #[test]
    fn registry_knows_builtin_namespaces() {
        let registry = InMemoryStringIndex::namespace_registry();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.string_to_index("").unwrap(), 0);
        assert_eq!(registry.string_to_index(namespaces::JCR).unwrap(), 1);
    }

    #[test]
    fn from_pairs_rejects_gaps() {
        let pairs = vec![("a".to_string(), 0), ("b".to_string(), 2)];
        assert!(Interner::from_pairs(pairs).is_err());
    }

    #[test]
    fn concurrent_interning_is_consistent() {
        use std::sync::Arc;
        use std::thread;

        let index = Arc::new(InMemoryStringIndex::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    (0..50)
                        .map(|i| index.string_to_index(&format!("name-{i}")).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<u32>> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();
        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
        assert_eq!(index.len(), 50);
    }
}
