//! Domain types shared by the engine and its collaborators.
//!
//! All types are JSON-serializable so the embedded state store can persist
//! them and the API can return them unchanged.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::route::Route;

/// Opaque identifier of an uploaded or imported artifact.
pub type BlobUid = String;

/// Identifier of a staging pipeline run.
pub type StageId = String;

/// Port every application workload listens on.
pub const APP_PORT: u16 = 8080;

// ── Application ───────────────────────────────────────────────────

/// Identity of an application: unique name within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppRef {
    pub namespace: String,
    pub name: String,
}

impl AppRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Composite key used by stores: `{namespace}/{name}`.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Display for AppRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Where the code of an application came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppOrigin {
    /// Local directory or archive pushed through upload.
    Path { path: String },
    /// Git repository imported at a revision.
    Git {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
    },
    /// Pre-built container image, no staging.
    Container { image: String },
}

/// Declared state of an application, as held by the resource store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub meta: AppRef,
    /// Desired routes. Never empty once created.
    pub routes: BTreeSet<Route>,
    /// Desired instance count.
    pub instances: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<AppOrigin>,
    /// Artifact backing the currently deployed workload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<BlobUid>,
    /// Names of services (same namespace) bound to this application.
    #[serde(default)]
    pub bound_services: BTreeSet<String>,
    /// Unix timestamp (seconds) of creation.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last update.
    pub updated_at: u64,
}

impl Application {
    /// A freshly created application with one desired instance.
    pub fn new(meta: AppRef, routes: BTreeSet<Route>) -> Self {
        let now = epoch_secs();
        Self {
            meta,
            routes,
            instances: 1,
            origin: None,
            artifact: None,
            bound_services: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of an application. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<BTreeSet<Route>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<AppOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<BlobUid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_services: Option<BTreeSet<String>>,
}

impl ApplicationUpdate {
    /// Apply the set fields to `app` and bump its update timestamp.
    pub fn apply_to(&self, app: &mut Application) {
        if let Some(routes) = &self.routes {
            app.routes = routes.clone();
        }
        if let Some(instances) = self.instances {
            app.instances = instances;
        }
        if let Some(origin) = &self.origin {
            app.origin = Some(origin.clone());
        }
        if let Some(artifact) = &self.artifact {
            app.artifact = Some(artifact.clone());
        }
        if let Some(services) = &self.bound_services {
            app.bound_services = services.clone();
        }
        app.updated_at = epoch_secs();
    }
}

/// Which applications a listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Namespace(String),
    All,
}

// ── Namespace ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    pub created_at: u64,
}

// ── Ingress / certificates ────────────────────────────────────────

/// One ingress rule: a single route pointing at an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub app: AppRef,
    pub name: String,
    pub route: Route,
    pub service_port: u16,
}

impl IngressRule {
    pub fn for_route(app: &AppRef, route: &Route) -> Self {
        Self {
            app: app.clone(),
            name: route.ingress_name(&app.name),
            route: route.clone(),
            service_port: APP_PORT,
        }
    }

    /// Composite key: `{namespace}/{app}/{route}`.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.app.table_key(), self.route)
    }
}

/// Per-application TLS certificate object batching all route hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub app: AppRef,
    pub name: String,
    pub dns_names: BTreeSet<String>,
}

impl Certificate {
    pub fn new(app: &AppRef, dns_names: BTreeSet<String>) -> Self {
        Self {
            app: app.clone(),
            name: format!("{}-tls", app.name),
            dns_names,
        }
    }
}

// ── Blobs, stage and deploy records ───────────────────────────────

/// Where an artifact's content came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlobSource {
    /// Bytes pushed through upload and held by the store.
    #[default]
    Upload,
    /// Repository reference; the pipeline fetches the tree when staging.
    Git {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<String>,
    },
}

/// Metadata of an artifact held by the artifact store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    pub uid: BlobUid,
    pub owner: AppRef,
    pub size_bytes: u64,
    pub created_at: u64,
    #[serde(default)]
    pub source: BlobSource,
}

/// Input to the staging pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequest {
    pub app: AppRef,
    pub blob_uid: BlobUid,
    pub builder_image: String,
}

/// A staging pipeline run: (application, artifact, builder) → image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub id: StageId,
    pub app: AppRef,
    pub blob_uid: BlobUid,
    pub builder_image: String,
    /// Image the pipeline publishes once the run completes.
    pub image_url: String,
    pub created_at: u64,
}

/// Binds an application to a workload rollout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRecord {
    pub app: AppRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<StageId>,
    pub image: String,
    pub origin: AppOrigin,
}

// ── Workloads ─────────────────────────────────────────────────────

/// Desired shape of the running workload of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub app: AppRef,
    pub image: String,
    pub replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<StageId>,
    /// Services whose credentials are mounted into the workload.
    #[serde(default)]
    pub services: BTreeSet<String>,
}

/// Observed state of a workload. Read-only for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    pub image: String,
    pub ready_replicas: u32,
    pub desired_replicas: u32,
    /// Restarts observed on the workload, requested ones included.
    pub restarts: u32,
    pub milli_cpus: u64,
    pub memory_bytes: u64,
    /// Unix timestamp (seconds) the workload was first created.
    pub created_at: u64,
}

impl WorkloadStatus {
    /// `ready/desired`, e.g. `1/1`.
    pub fn summary(&self) -> String {
        format!("{}/{}", self.ready_replicas, self.desired_replicas)
    }

    /// A workload with no desired replicas has nothing mounted to refresh.
    pub fn is_running(&self) -> bool {
        self.desired_replicas > 0
    }
}

// ── Services ──────────────────────────────────────────────────────

/// A backing service instance, bindable to applications of its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub namespace: String,
    pub name: String,
    /// Credentials/configuration exposed to bound workloads.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Service {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        data: BTreeMap<String, String>,
    ) -> Self {
        let now = epoch_secs();
        Self {
            namespace: namespace.into(),
            name: name.into(),
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Composite key: `{namespace}/{name}`.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Change to a service's data: removals are applied before assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceUpdate {
    #[serde(default)]
    pub remove: Vec<String>,
    #[serde(default)]
    pub set: BTreeMap<String, String>,
}

impl ServiceUpdate {
    pub fn apply_to(&self, service: &mut Service) {
        for key in &self.remove {
            service.data.remove(key);
        }
        for (key, value) in &self.set {
            service.data.insert(key.clone(), value.clone());
        }
        service.updated_at = epoch_secs();
    }
}

/// Current Unix epoch in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
