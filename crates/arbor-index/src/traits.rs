use crate::error::IndexResult;

/// Bidirectional mapping between strings and small integers.
///
/// Implementations must hand out a stable integer per string for the whole
/// lifetime of the backing resource: once `s` maps to `i`, it always maps to
/// `i`. Unknown strings are assigned the next free integer on first use.
pub trait StringIndex: Send + Sync {
    /// Map a string to its integer, allocating one if the string is new.
    fn string_to_index(&self, s: &str) -> IndexResult<u32>;

    /// Reverse lookup, mainly for diagnostics.
    fn index_to_string(&self, index: u32) -> Option<String>;

    /// Number of strings currently interned.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All `(string, index)` pairs ordered by index.
    fn entries(&self) -> Vec<(String, u32)>;
}
