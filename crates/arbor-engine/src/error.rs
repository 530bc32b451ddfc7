//! Engine error taxonomy.

use arbor_core::StoreError;
use thiserror::Error;

use crate::reconciler::RouteOp;

/// Typed failures returned to callers of the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request could not be decoded into the expected shape.
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("{0}")]
    Validation(String),

    #[error("{kind} '{name}' does not exist")]
    NotFound { kind: &'static str, name: String },

    #[error("blob app mismatch: expected: {expected}, found: {found}")]
    OwnershipMismatch { expected: String, found: String },

    #[error("{0}")]
    Conflict(String),

    #[error("backend call failed: {0}")]
    Dependency(#[from] StoreError),

    /// Route changes stopped at the first failing operation. `failed`
    /// holds the failing operation followed by those never attempted.
    #[error("route reconciliation incomplete ({} applied, {} not applied): {reason}", .applied.len(), .failed.len())]
    PartialReconcile {
        applied: Vec<RouteOp>,
        failed: Vec<RouteOp>,
        reason: String,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Whether retrying the same request can succeed without the caller
    /// changing it first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Dependency(_) | Self::PartialReconcile { .. } | Self::Cancelled
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
