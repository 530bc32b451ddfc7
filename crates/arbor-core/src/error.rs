//! Errors reported by engine collaborators.

use thiserror::Error;

/// Result type alias for collaborator calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure of a resource store, artifact store, pipeline, or workload call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Wrap any displayable backend failure.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}
