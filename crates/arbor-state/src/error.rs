//! Error types for the arbor state store.

use arbor_core::StoreError;
use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),
}

impl From<StateError> for StoreError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(what) => StoreError::NotFound(what),
            StateError::AlreadyExists(what) => StoreError::AlreadyExists(what),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
