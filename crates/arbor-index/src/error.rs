//! Error types for string index operations.

use std::path::PathBuf;

/// Errors that can occur while loading or extending a string index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// I/O error reading or writing an index resource.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The index resource could not be parsed or encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The index resource parsed but its contents are inconsistent.
    #[error("corrupt index {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
