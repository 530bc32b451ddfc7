//! arbor-api: REST API for arbor.
//!
//! Every handler maps to exactly one `ControlPlane` operation. Responses use
//! the envelope `{ success, data?, error? }`.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/namespaces` | List namespaces |
//! | POST | `/api/v1/namespaces` | Create a namespace |
//! | DELETE | `/api/v1/namespaces/{ns}` | Delete a namespace and everything in it |
//! | GET | `/api/v1/applications` | List applications of all namespaces |
//! | GET | `/api/v1/namespaces/{ns}/applications` | List applications |
//! | POST | `/api/v1/namespaces/{ns}/applications` | Create an application |
//! | GET | `/api/v1/namespaces/{ns}/applications/{app}` | Application with workload status |
//! | PATCH | `/api/v1/namespaces/{ns}/applications/{app}` | Update routes and/or instances |
//! | DELETE | `/api/v1/namespaces/{ns}/applications/{app}` | Delete an application |
//! | POST | `/api/v1/namespaces/{ns}/applications/{app}/scale` | Set the instance count |
//! | POST | `/api/v1/namespaces/{ns}/applications/{app}/upload` | Upload an artifact (raw body) |
//! | POST | `/api/v1/namespaces/{ns}/applications/{app}/import-git` | Record a git repository as an artifact |
//! | POST | `/api/v1/namespaces/{ns}/applications/{app}/stage` | Stage an uploaded artifact |
//! | POST | `/api/v1/namespaces/{ns}/applications/{app}/deploy` | Deploy a stage or an image |
//! | GET | `/api/v1/namespaces/{ns}/services` | List services |
//! | POST | `/api/v1/namespaces/{ns}/services` | Create a service |
//! | GET | `/api/v1/namespaces/{ns}/services/{svc}` | Service with bound applications |
//! | PATCH | `/api/v1/namespaces/{ns}/services/{svc}` | Update service data, restart bound apps |
//! | DELETE | `/api/v1/namespaces/{ns}/services/{svc}?unbind=true` | Delete a service |
//! | POST | `/api/v1/namespaces/{ns}/services/{svc}/bindings` | Bind to an application |
//! | DELETE | `/api/v1/namespaces/{ns}/services/{svc}/bindings/{app}` | Unbind |

pub mod error;
pub mod handlers;

use arbor_engine::ControlPlane;
use axum::Router;
use axum::routing::{delete, get, post};
use tokio::sync::watch;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub plane: ControlPlane,
    /// Flips to `true` on shutdown; stops long teardowns from dispatching
    /// more work.
    pub shutdown: Option<watch::Receiver<bool>>,
}

/// Build the API router.
pub fn build_router(plane: ControlPlane, shutdown: Option<watch::Receiver<bool>>) -> Router {
    let state = ApiState { plane, shutdown };

    let api_routes = Router::new()
        .route("/namespaces", get(handlers::list_namespaces).post(handlers::create_namespace))
        .route("/namespaces/{ns}", delete(handlers::delete_namespace))
        .route("/applications", get(handlers::list_all_applications))
        .route(
            "/namespaces/{ns}/applications",
            get(handlers::list_applications).post(handlers::create_application),
        )
        .route(
            "/namespaces/{ns}/applications/{app}",
            get(handlers::show_application)
                .patch(handlers::update_application)
                .delete(handlers::delete_application),
        )
        .route("/namespaces/{ns}/applications/{app}/scale", post(handlers::scale_application))
        .route("/namespaces/{ns}/applications/{app}/upload", post(handlers::upload))
        .route("/namespaces/{ns}/applications/{app}/import-git", post(handlers::import_git))
        .route("/namespaces/{ns}/applications/{app}/stage", post(handlers::stage))
        .route("/namespaces/{ns}/applications/{app}/deploy", post(handlers::deploy))
        .route(
            "/namespaces/{ns}/services",
            get(handlers::list_services).post(handlers::create_service),
        )
        .route(
            "/namespaces/{ns}/services/{svc}",
            get(handlers::show_service)
                .patch(handlers::update_service)
                .delete(handlers::delete_service),
        )
        .route("/namespaces/{ns}/services/{svc}/bindings", post(handlers::bind_service))
        .route(
            "/namespaces/{ns}/services/{svc}/bindings/{app}",
            delete(handlers::unbind_service),
        )
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
