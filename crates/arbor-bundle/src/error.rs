use arbor_index::IndexError;

/// Errors raised by bundle storage: backends, blob stores and the record
/// codec.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored record failed its integrity checks.
    #[error("corrupt record {what}: {reason}")]
    Corrupt { what: String, reason: String },

    /// An externalized value referenced by a bundle is missing.
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// Interning a name for a storage path failed.
    #[error("string index error: {0}")]
    Index(#[from] IndexError),

    /// Backend-specific failure that fits no other category.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
