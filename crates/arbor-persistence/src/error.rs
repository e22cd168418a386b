use arbor_bundle::StorageError;
use arbor_index::IndexError;
use arbor_types::ItemId;

/// Errors surfaced by the persistence manager.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The requested node, property or reference list does not exist.
    #[error("item not found: {0}")]
    NotFound(ItemId),

    /// The backend or blob store failed.
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    /// Invalid configuration or unusable string indices. Fatal at setup.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<IndexError> for PersistenceError {
    fn from(e: IndexError) -> Self {
        Self::Configuration(e.to_string())
    }
}

/// Result alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
