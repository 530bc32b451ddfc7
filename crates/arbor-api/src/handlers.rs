//! REST API handlers.
//!
//! Each handler calls one `ControlPlane` operation and wraps the result in
//! the response envelope. Body decoding failures surface as malformed
//! requests in the same envelope.

use arbor_core::{Scope, ServiceUpdate};
use arbor_engine::{
    AppCreateRequest, AppUpdateRequest, DeployParams, ImportGitParams, ServiceCreateRequest,
    StageParams,
};
use axum::Json;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ApiState;
use crate::error::ApiError;

type ApiResult = Result<Response, ApiError>;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }

    pub(crate) fn failure(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn ok<T: Serialize>(data: T) -> ApiResult {
    Ok(ApiResponse::ok(data).into_response())
}

fn created<T: Serialize>(data: T) -> ApiResult {
    Ok((StatusCode::CREATED, ApiResponse::ok(data)).into_response())
}

// ── Namespaces ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NamespaceRequest {
    pub name: String,
}

/// GET /api/v1/namespaces
pub async fn list_namespaces(State(state): State<ApiState>) -> ApiResult {
    ok(state.plane.list_namespaces().await?)
}

/// POST /api/v1/namespaces
pub async fn create_namespace(
    State(state): State<ApiState>,
    body: Result<Json<NamespaceRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body?;
    created(state.plane.create_namespace(&req.name).await?)
}

/// DELETE /api/v1/namespaces/{ns}
pub async fn delete_namespace(
    State(state): State<ApiState>,
    Path(ns): Path<String>,
) -> ApiResult {
    ok(state.plane.delete_namespace(&ns, state.shutdown.clone()).await?)
}

// ── Applications ───────────────────────────────────────────────

/// GET /api/v1/applications
pub async fn list_all_applications(State(state): State<ApiState>) -> ApiResult {
    ok(state.plane.list_applications(&Scope::All).await?)
}

/// GET /api/v1/namespaces/{ns}/applications
pub async fn list_applications(
    State(state): State<ApiState>,
    Path(ns): Path<String>,
) -> ApiResult {
    ok(state.plane.list_applications(&Scope::Namespace(ns)).await?)
}

/// POST /api/v1/namespaces/{ns}/applications
pub async fn create_application(
    State(state): State<ApiState>,
    Path(ns): Path<String>,
    body: Result<Json<AppCreateRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body?;
    created(state.plane.create_application(&ns, &req).await?)
}

/// GET /api/v1/namespaces/{ns}/applications/{app}
pub async fn show_application(
    State(state): State<ApiState>,
    Path((ns, app)): Path<(String, String)>,
) -> ApiResult {
    ok(state.plane.show_application(&ns, &app).await?)
}

/// PATCH /api/v1/namespaces/{ns}/applications/{app}
pub async fn update_application(
    State(state): State<ApiState>,
    Path((ns, app)): Path<(String, String)>,
    body: Result<Json<AppUpdateRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body?;
    ok(state.plane.update_application(&ns, &app, &req).await?)
}

/// DELETE /api/v1/namespaces/{ns}/applications/{app}
pub async fn delete_application(
    State(state): State<ApiState>,
    Path((ns, app)): Path<(String, String)>,
) -> ApiResult {
    ok(state.plane.delete_application(&ns, &app).await?)
}

/// Scale request body. `instances` stays raw JSON until the engine has
/// checked its shape.
#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub instances: Value,
}

/// POST /api/v1/namespaces/{ns}/applications/{app}/scale
pub async fn scale_application(
    State(state): State<ApiState>,
    Path((ns, app)): Path<(String, String)>,
    body: Result<Json<ScaleRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body?;
    ok(state.plane.scale_application(&ns, &app, &req.instances).await?)
}

// ── Upload / stage / deploy ────────────────────────────────────

/// POST /api/v1/namespaces/{ns}/applications/{app}/upload
pub async fn upload(
    State(state): State<ApiState>,
    Path((ns, app)): Path<(String, String)>,
    content: Bytes,
) -> ApiResult {
    created(state.plane.upload(&ns, &app, &content).await?)
}

/// POST /api/v1/namespaces/{ns}/applications/{app}/import-git
pub async fn import_git(
    State(state): State<ApiState>,
    Path((ns, app)): Path<(String, String)>,
    body: Result<Json<ImportGitParams>, JsonRejection>,
) -> ApiResult {
    let Json(params) = body?;
    created(state.plane.import_git(&ns, &app, &params).await?)
}

/// POST /api/v1/namespaces/{ns}/applications/{app}/stage
pub async fn stage(
    State(state): State<ApiState>,
    Path((ns, app)): Path<(String, String)>,
    body: Result<Json<StageParams>, JsonRejection>,
) -> ApiResult {
    let Json(params) = body?;
    created(state.plane.stage(&ns, &app, &params).await?)
}

/// POST /api/v1/namespaces/{ns}/applications/{app}/deploy
pub async fn deploy(
    State(state): State<ApiState>,
    Path((ns, app)): Path<(String, String)>,
    body: Result<Json<DeployParams>, JsonRejection>,
) -> ApiResult {
    let Json(params) = body?;
    ok(state.plane.deploy(&ns, &app, &params).await?)
}

// ── Services ───────────────────────────────────────────────────

/// GET /api/v1/namespaces/{ns}/services
pub async fn list_services(State(state): State<ApiState>, Path(ns): Path<String>) -> ApiResult {
    ok(state.plane.list_services(&ns).await?)
}

/// POST /api/v1/namespaces/{ns}/services
pub async fn create_service(
    State(state): State<ApiState>,
    Path(ns): Path<String>,
    body: Result<Json<ServiceCreateRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body?;
    created(state.plane.create_service(&ns, &req).await?)
}

/// GET /api/v1/namespaces/{ns}/services/{svc}
pub async fn show_service(
    State(state): State<ApiState>,
    Path((ns, svc)): Path<(String, String)>,
) -> ApiResult {
    ok(state.plane.show_service(&ns, &svc).await?)
}

/// PATCH /api/v1/namespaces/{ns}/services/{svc}
pub async fn update_service(
    State(state): State<ApiState>,
    Path((ns, svc)): Path<(String, String)>,
    body: Result<Json<ServiceUpdate>, JsonRejection>,
) -> ApiResult {
    let Json(update) = body?;
    ok(state.plane.update_service(&ns, &svc, &update).await?)
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteServiceQuery {
    #[serde(default)]
    pub unbind: bool,
}

/// DELETE /api/v1/namespaces/{ns}/services/{svc}
pub async fn delete_service(
    State(state): State<ApiState>,
    Path((ns, svc)): Path<(String, String)>,
    Query(query): Query<DeleteServiceQuery>,
) -> ApiResult {
    ok(state.plane.delete_service(&ns, &svc, query.unbind).await?)
}

#[derive(Debug, Deserialize)]
pub struct BindRequest {
    pub app: String,
}

/// POST /api/v1/namespaces/{ns}/services/{svc}/bindings
pub async fn bind_service(
    State(state): State<ApiState>,
    Path((ns, svc)): Path<(String, String)>,
    body: Result<Json<BindRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body?;
    created(state.plane.bind_service(&ns, &svc, &req.app).await?)
}

/// DELETE /api/v1/namespaces/{ns}/services/{svc}/bindings/{app}
pub async fn unbind_service(
    State(state): State<ApiState>,
    Path((ns, svc, app)): Path<(String, String, String)>,
) -> ApiResult {
    ok(state.plane.unbind_service(&ns, &svc, &app).await?)
}
