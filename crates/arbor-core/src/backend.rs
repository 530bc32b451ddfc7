//! Collaborator traits.
//!
//! The engine never talks to a cluster, object store, or build system
//! directly. It reaches them through these traits, which the embedded state
//! store implements for standalone operation and tests. Every call is a
//! potential suspension point; implementations are expected to serialize
//! conflicting writes to the same object themselves.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::route::Route;
use crate::types::*;

/// System of record for namespaces, applications, ingress rules,
/// certificates, and backing services.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn create_namespace(&self, name: &str) -> StoreResult<Namespace>;
    async fn namespace_exists(&self, name: &str) -> StoreResult<bool>;
    async fn list_namespaces(&self) -> StoreResult<Vec<Namespace>>;
    /// Returns `false` when the namespace did not exist.
    async fn delete_namespace(&self, name: &str) -> StoreResult<bool>;

    async fn get_application(&self, app: &AppRef) -> StoreResult<Option<Application>>;
    /// Fails with `AlreadyExists` on a duplicate name.
    async fn create_application(&self, app: &Application) -> StoreResult<()>;
    /// Read-modify-write of one application. `NotFound` if absent.
    async fn update_application(
        &self,
        app: &AppRef,
        update: &ApplicationUpdate,
    ) -> StoreResult<Application>;
    async fn delete_application(&self, app: &AppRef) -> StoreResult<bool>;
    async fn list_applications(&self, scope: &Scope) -> StoreResult<Vec<Application>>;

    async fn list_ingress_rules(&self, app: &AppRef) -> StoreResult<Vec<IngressRule>>;
    async fn create_or_update_ingress_rule(&self, rule: &IngressRule) -> StoreResult<()>;
    async fn delete_ingress_rule(&self, app: &AppRef, route: &Route) -> StoreResult<bool>;

    async fn get_certificate(&self, app: &AppRef) -> StoreResult<Option<Certificate>>;
    async fn create_or_update_certificate(&self, cert: &Certificate) -> StoreResult<()>;
    async fn delete_certificate(&self, app: &AppRef) -> StoreResult<bool>;

    /// Fails with `AlreadyExists` on a duplicate name.
    async fn create_service(&self, service: &Service) -> StoreResult<()>;
    async fn get_service(&self, namespace: &str, name: &str) -> StoreResult<Option<Service>>;
    /// Read-modify-write of one service. `NotFound` if absent.
    async fn update_service(
        &self,
        namespace: &str,
        name: &str,
        update: &ServiceUpdate,
    ) -> StoreResult<Service>;
    async fn delete_service(&self, namespace: &str, name: &str) -> StoreResult<bool>;
    async fn list_services(&self, namespace: &str) -> StoreResult<Vec<Service>>;
    /// Applications of `namespace` that have `service` bound.
    async fn list_bound_applications(
        &self,
        namespace: &str,
        service: &str,
    ) -> StoreResult<Vec<AppRef>>;
}

/// Durable storage for uploaded or imported code artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `content` owned by `owner` and return its record.
    async fn put_artifact(&self, owner: &AppRef, content: &[u8]) -> StoreResult<BlobRecord>;
    /// Record a git repository at `revision` (default branch when `None`)
    /// as an artifact owned by `owner`.
    async fn import_git(
        &self,
        owner: &AppRef,
        url: &str,
        revision: Option<&str>,
    ) -> StoreResult<BlobRecord>;
    /// Owning application of an artifact, `None` if unknown.
    async fn get_artifact_owner(&self, uid: &str) -> StoreResult<Option<AppRef>>;
    async fn artifact_exists(&self, uid: &str) -> StoreResult<bool>;
    /// Idempotent: returns `false` when the artifact was already absent.
    async fn delete_artifact(&self, uid: &str) -> StoreResult<bool>;
}

/// External build system turning an artifact into a runnable image.
#[async_trait]
pub trait StagingPipeline: Send + Sync {
    /// Start a run. Completion is observed out of band.
    async fn stage(&self, request: &StageRequest) -> StoreResult<StageRecord>;
    async fn get_stage(&self, id: &str) -> StoreResult<Option<StageRecord>>;
}

/// Primitive operations on the running workload of an application.
#[async_trait]
pub trait WorkloadController: Send + Sync {
    /// Create or roll the workload to `spec`.
    async fn apply_workload(&self, spec: &WorkloadSpec) -> StoreResult<WorkloadStatus>;
    /// Returns `false` when the application has no workload.
    async fn set_desired_replicas(&self, app: &AppRef, replicas: u32) -> StoreResult<bool>;
    /// Restart pods in place so mounted configuration is re-read.
    async fn restart_workload(&self, app: &AppRef) -> StoreResult<()>;
    async fn get_workload_status(&self, app: &AppRef) -> StoreResult<Option<WorkloadStatus>>;
    async fn delete_workload(&self, app: &AppRef) -> StoreResult<bool>;
}
