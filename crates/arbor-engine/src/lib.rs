//! arbor-engine: the application reconciliation engine.
//!
//! Drives declared application state toward the collaborators behind the
//! `arbor-core` traits. Every operation is request scoped: it runs to
//! completion (or failure) before returning, and no background tasks
//! outlive the call.
//!
//! # Architecture
//!
//! ```text
//! ControlPlane
//!   ├── RouteReconciler   (ingress rules + per-app certificate)
//!   ├── BlobManager       (artifact ownership, promotion, GC)
//!   ├── InstanceScaler    (instance validation, replica updates)
//!   ├── BulkExecutor      (bounded fan-out for namespace teardown)
//!   └── ServiceSupervisor (restart bound workloads on service change)
//! ```

pub mod blobs;
pub mod bulk;
pub mod control_plane;
pub mod error;
pub mod reconciler;
pub mod scaler;
pub mod supervisor;

pub use blobs::{BlobManager, GcOutcome, PromoteOutcome};
pub use bulk::{BulkError, BulkExecutor, BulkReport};
pub use control_plane::*;
pub use error::{EngineError, EngineResult};
pub use reconciler::{ReconcileReport, RouteDiff, RouteOp, RouteReconciler};
pub use scaler::{InstanceScaler, ScaleOutcome};
pub use supervisor::{RestartFailure, ServiceSupervisor, SupervisorReport};
