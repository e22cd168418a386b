use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid node identifier: {0}")]
    InvalidNodeId(String),

    #[error("invalid qualified name: {0}")]
    InvalidName(String),

    #[error("invalid property identifier: {0}")]
    InvalidPropertyId(String),
}
