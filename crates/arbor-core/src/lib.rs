//! arbor-core: shared vocabulary of the arbor control plane.
//!
//! Holds the route model, the persisted domain types, the traits through
//! which the engine reaches its collaborators (resource store, artifact
//! store, staging pipeline, workload primitive), and engine configuration.

pub mod backend;
pub mod config;
pub mod error;
pub mod route;
pub mod types;

pub use backend::{ArtifactStore, ResourceStore, StagingPipeline, WorkloadController};
pub use config::EngineConfig;
pub use error::{StoreError, StoreResult};
pub use route::{Route, RouteError, is_dns_label, parse_routes};
pub use types::*;
