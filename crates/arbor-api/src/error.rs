//! Mapping of engine errors onto HTTP responses.

use arbor_engine::EngineError;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use crate::handlers::ApiResponse;

/// Error returned by handlers.
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(EngineError::Malformed(rejection.body_text()))
    }
}

pub fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Malformed(_)
        | EngineError::Validation(_)
        | EngineError::OwnershipMismatch { .. } => StatusCode::BAD_REQUEST,
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::Conflict(_) => StatusCode::CONFLICT,
        EngineError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Dependency(_) | EngineError::PartialReconcile { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(%status, error = %self.0, "request failed");
        } else {
            debug!(%status, error = %self.0, "request rejected");
        }
        (status, Json(ApiResponse::<()>::failure(self.0.to_string()))).into_response()
    }
}
