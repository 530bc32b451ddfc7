//! Control plane facade: one method per externally triggered operation.
//!
//! Each method validates its input, checks that the objects it touches
//! exist, and sequences the engine components against the collaborators.
//! The facade is cheap to clone; bulk teardown hands clones to its units.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arbor_core::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::blobs::{BlobManager, GcOutcome, PromoteOutcome};
use crate::bulk::{BulkError, BulkExecutor};
use crate::error::{EngineError, EngineResult};
use crate::reconciler::{ReconcileReport, RouteReconciler};
use crate::scaler::{InstanceScaler, ScaleOutcome, parse_instances, validate_instances};
use crate::supervisor::{ServiceSupervisor, ServiceUpdated};

/// The external systems the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub resources: Arc<dyn ResourceStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub pipeline: Arc<dyn StagingPipeline>,
    pub workloads: Arc<dyn WorkloadController>,
}

impl Collaborators {
    /// Use one backend for every role, as the embedded store does.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ResourceStore + ArtifactStore + StagingPipeline + WorkloadController + 'static,
    {
        Self {
            resources: backend.clone(),
            artifacts: backend.clone(),
            pipeline: backend.clone(),
            workloads: backend,
        }
    }
}

// ── Requests ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCreateRequest {
    pub name: String,
    /// Empty means the default route `<name>.<domain>`.
    #[serde(default)]
    pub routes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppUpdateRequest {
    #[serde(default)]
    pub routes: Option<Vec<String>>,
    /// Raw JSON so shape errors are told apart from range errors.
    #[serde(default)]
    pub instances: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageParams {
    pub blob_uid: BlobUid,
    #[serde(default)]
    pub builder_image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportGitParams {
    pub url: String,
    /// Branch, tag or commit; the default branch when absent.
    #[serde(default)]
    pub revision: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployParams {
    #[serde(default)]
    pub stage_id: Option<StageId>,
    /// Required when `stage_id` is absent.
    #[serde(default)]
    pub image: Option<String>,
    pub origin: AppOrigin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCreateRequest {
    pub name: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

// ── Responses ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkloadView {
    /// `ready/desired`.
    pub status: String,
    #[serde(flatten)]
    pub detail: WorkloadStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppDetails {
    #[serde(flatten)]
    pub application: Application,
    pub workload: Option<WorkloadView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppUpdated {
    pub application: Application,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes: Option<ReconcileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<ScaleOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployOutcome {
    pub application: Application,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<StageId>,
    pub image: String,
    pub workload: WorkloadStatus,
    pub routes: ReconcileReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<PromoteOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppDeleted {
    pub app: AppRef,
    pub unbound_services: Vec<String>,
    pub routes: ReconcileReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<GcOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceDeleted {
    pub namespace: String,
    pub applications: usize,
    pub services: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDetails {
    #[serde(flatten)]
    pub service: Service,
    pub bound_apps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingChanged {
    pub application: Application,
    pub service: String,
    pub restarted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDeleted {
    pub service: String,
    pub unbound_apps: Vec<String>,
}

// ── Control plane ─────────────────────────────────────────────────

fn check_name(kind: &str, name: &str) -> EngineResult<()> {
    if name.is_empty() {
        return Err(EngineError::Validation(format!("{kind} name must not be empty")));
    }
    if !is_dns_label(name) {
        return Err(EngineError::Validation(format!(
            "invalid {kind} name '{name}': must be a lower-case DNS label"
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct ControlPlane {
    config: Arc<EngineConfig>,
    resources: Arc<dyn ResourceStore>,
    pipeline: Arc<dyn StagingPipeline>,
    workloads: Arc<dyn WorkloadController>,
    reconciler: RouteReconciler,
    blobs: BlobManager,
    scaler: InstanceScaler,
    supervisor: ServiceSupervisor,
    bulk: BulkExecutor,
}

impl ControlPlane {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            resources,
            artifacts,
            pipeline,
            workloads,
        } = collaborators;
        Self {
            reconciler: RouteReconciler::new(resources.clone()),
            blobs: BlobManager::new(resources.clone(), artifacts),
            scaler: InstanceScaler::new(resources.clone(), workloads.clone()),
            supervisor: ServiceSupervisor::new(
                resources.clone(),
                workloads.clone(),
                config.restart_concurrency,
            ),
            bulk: BulkExecutor::new(config.bulk_concurrency),
            config: Arc::new(config),
            resources,
            pipeline,
            workloads,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Lookups ────────────────────────────────────────────────────

    async fn require_namespace(&self, namespace: &str) -> EngineResult<()> {
        if self.resources.namespace_exists(namespace).await? {
            Ok(())
        } else {
            Err(EngineError::not_found("namespace", namespace))
        }
    }

    async fn require_app(&self, app: &AppRef) -> EngineResult<Application> {
        self.require_namespace(&app.namespace).await?;
        self.resources
            .get_application(app)
            .await?
            .ok_or_else(|| EngineError::not_found("application", app.to_string()))
    }

    async fn require_service(&self, namespace: &str, name: &str) -> EngineResult<Service> {
        self.require_namespace(namespace).await?;
        self.resources
            .get_service(namespace, name)
            .await?
            .ok_or_else(|| EngineError::not_found("service", format!("{namespace}/{name}")))
    }

    /// Parse requested routes; an empty list yields the default route.
    fn desired_routes(&self, app: &str, raw: &[String]) -> EngineResult<BTreeSet<Route>> {
        let mut routes =
            parse_routes(raw).map_err(|e| EngineError::Validation(e.to_string()))?;
        if routes.is_empty() {
            let route = Route::default_for(app, &self.config.domain)
                .map_err(|e| EngineError::Validation(e.to_string()))?;
            routes.insert(route);
        }
        Ok(routes)
    }

    async fn restart_if_running(&self, app: &AppRef) -> EngineResult<bool> {
        match self.workloads.get_workload_status(app).await? {
            Some(status) if status.is_running() => {
                self.workloads.restart_workload(app).await?;
                info!(%app, "workload restarted");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_bound_services(
        &self,
        app: &AppRef,
        services: BTreeSet<String>,
    ) -> EngineResult<Application> {
        let update = ApplicationUpdate {
            bound_services: Some(services),
            ..Default::default()
        };
        Ok(self.resources.update_application(app, &update).await?)
    }

    // ── Namespaces ─────────────────────────────────────────────────

    pub async fn create_namespace(&self, name: &str) -> EngineResult<Namespace> {
        check_name("namespace", name)?;
        let namespace = self.resources.create_namespace(name).await.map_err(|e| match e {
            StoreError::AlreadyExists(_) => {
                EngineError::Conflict(format!("namespace '{name}' already exists"))
            }
            other => other.into(),
        })?;
        info!(namespace = %name, "namespace created");
        Ok(namespace)
    }

    pub async fn list_namespaces(&self) -> EngineResult<Vec<Namespace>> {
        Ok(self.resources.list_namespaces().await?)
    }

    /// Delete every application (bounded fan-out), then every service,
    /// then the namespace. A failed or cancelled application teardown
    /// leaves services and the namespace in place.
    pub async fn delete_namespace(
        &self,
        name: &str,
        cancel: Option<watch::Receiver<bool>>,
    ) -> EngineResult<NamespaceDeleted> {
        self.require_namespace(name).await?;

        let apps: Vec<AppRef> = self
            .resources
            .list_applications(&Scope::Namespace(name.to_string()))
            .await?
            .into_iter()
            .map(|app| app.meta)
            .collect();
        let applications = apps.len();
        info!(
            namespace = %name,
            applications,
            concurrency = self.bulk.concurrency(),
            "deleting namespace applications"
        );

        let plane = self.clone();
        self.bulk
            .run(
                apps,
                move |app: AppRef| {
                    let plane = plane.clone();
                    async move { plane.remove_application(&app).await.map(|_| ()) }
                },
                cancel,
            )
            .await
            .map_err(|e| match e {
                BulkError::Unit {
                    error,
                    index,
                    failed,
                    total,
                } => {
                    warn!(namespace = %name, index, failed, total, error = %error, "namespace teardown failed");
                    error
                }
                BulkError::Cancelled { dispatched, total } => {
                    warn!(namespace = %name, dispatched, total, "namespace teardown cancelled");
                    EngineError::Cancelled
                }
                BulkError::Panicked(reason) => EngineError::Dependency(StoreError::Backend(reason)),
            })?;

        let services = self.resources.list_services(name).await?;
        for service in &services {
            self.resources.delete_service(name, &service.name).await?;
        }
        self.resources.delete_namespace(name).await?;

        info!(namespace = %name, applications, services = services.len(), "namespace deleted");
        Ok(NamespaceDeleted {
            namespace: name.to_string(),
            applications,
            services: services.len(),
        })
    }

    // ── Applications ───────────────────────────────────────────────

    pub async fn create_application(
        &self,
        namespace: &str,
        request: &AppCreateRequest,
    ) -> EngineResult<Application> {
        check_name("application", &request.name)?;
        self.require_namespace(namespace).await?;
        let routes = self.desired_routes(&request.name, &request.routes)?;

        let meta = AppRef::new(namespace, &request.name);
        let app = Application::new(meta.clone(), routes);
        self.resources.create_application(&app).await.map_err(|e| match e {
            StoreError::AlreadyExists(_) => EngineError::Conflict(format!(
                "application '{}' already exists in namespace '{namespace}'",
                request.name
            )),
            other => other.into(),
        })?;
        info!(app = %meta, routes = app.routes.len(), "application created");

        self.reconciler.reconcile(&meta, &app.routes).await?;
        Ok(app)
    }

    pub async fn show_application(&self, namespace: &str, name: &str) -> EngineResult<AppDetails> {
        let meta = AppRef::new(namespace, name);
        let application = self.require_app(&meta).await?;
        let workload = self
            .workloads
            .get_workload_status(&meta)
            .await?
            .map(|detail| WorkloadView {
                status: detail.summary(),
                detail,
            });
        Ok(AppDetails {
            application,
            workload,
        })
    }

    pub async fn list_applications(&self, scope: &Scope) -> EngineResult<Vec<Application>> {
        if let Scope::Namespace(namespace) = scope {
            self.require_namespace(namespace).await?;
        }
        Ok(self.resources.list_applications(scope).await?)
    }

    /// Change routes and/or instances. Both inputs are validated before
    /// anything is written.
    pub async fn update_application(
        &self,
        namespace: &str,
        name: &str,
        request: &AppUpdateRequest,
    ) -> EngineResult<AppUpdated> {
        let instances = match &request.instances {
            Some(raw) => Some(validate_instances(parse_instances(raw)?)?),
            None => None,
        };
        let routes = match &request.routes {
            Some(raw) => Some(self.desired_routes(name, raw)?),
            None => None,
        };

        let meta = AppRef::new(namespace, name);
        self.require_app(&meta).await?;

        let routes = match routes {
            Some(routes) => {
                let update = ApplicationUpdate {
                    routes: Some(routes.clone()),
                    ..Default::default()
                };
                self.resources.update_application(&meta, &update).await?;
                Some(self.reconciler.reconcile(&meta, &routes).await?)
            }
            None => None,
        };
        let scale = match instances {
            Some(instances) => Some(self.scaler.apply(&meta, instances).await?),
            None => None,
        };

        let application = self.require_app(&meta).await?;
        Ok(AppUpdated {
            application,
            routes,
            scale,
        })
    }

    pub async fn delete_application(&self, namespace: &str, name: &str) -> EngineResult<AppDeleted> {
        self.require_namespace(namespace).await?;
        self.remove_application(&AppRef::new(namespace, name)).await
    }

    /// Cascade: unbind services, drop routes, remove the workload and the
    /// application object, then collect the active artifact.
    async fn remove_application(&self, meta: &AppRef) -> EngineResult<AppDeleted> {
        let app = self
            .resources
            .get_application(meta)
            .await?
            .ok_or_else(|| EngineError::not_found("application", meta.to_string()))?;

        let unbound_services: Vec<String> = app.bound_services.iter().cloned().collect();
        if !unbound_services.is_empty() {
            self.set_bound_services(meta, BTreeSet::new()).await?;
            debug!(app = %meta, services = ?unbound_services, "services unbound");
        }

        let routes = self.reconciler.reconcile(meta, &BTreeSet::new()).await?;
        self.workloads.delete_workload(meta).await?;
        self.resources.delete_application(meta).await?;

        let artifact = match &app.artifact {
            Some(uid) => Some(self.blobs.collect(uid).await),
            None => None,
        };
        info!(app = %meta, unbound = unbound_services.len(), "application deleted");
        Ok(AppDeleted {
            app: meta.clone(),
            unbound_services,
            routes,
            artifact,
        })
    }

    /// Decode, validate, and apply a raw instance count.
    pub async fn scale_application(
        &self,
        namespace: &str,
        name: &str,
        instances: &Value,
    ) -> EngineResult<ScaleOutcome> {
        let requested = validate_instances(parse_instances(instances)?)?;
        let meta = AppRef::new(namespace, name);
        self.require_app(&meta).await?;
        self.scaler.apply(&meta, requested).await
    }

    // ── Upload / stage / deploy ────────────────────────────────────

    pub async fn upload(&self, namespace: &str, name: &str, content: &[u8]) -> EngineResult<BlobRecord> {
        let meta = AppRef::new(namespace, name);
        self.require_app(&meta).await?;
        if content.is_empty() {
            return Err(EngineError::Validation("upload must not be empty".to_string()));
        }
        self.blobs.record_upload(&meta, content).await
    }

    pub async fn import_git(
        &self,
        namespace: &str,
        name: &str,
        params: &ImportGitParams,
    ) -> EngineResult<BlobRecord> {
        let url = params.url.trim();
        if url.is_empty() {
            return Err(EngineError::Validation("git url must not be empty".to_string()));
        }
        let meta = AppRef::new(namespace, name);
        self.require_app(&meta).await?;
        let revision = params
            .revision
            .as_deref()
            .map(str::trim)
            .filter(|rev| !rev.is_empty());
        self.blobs.record_import(&meta, url, revision).await
    }

    pub async fn stage(
        &self,
        namespace: &str,
        name: &str,
        params: &StageParams,
    ) -> EngineResult<StageRecord> {
        if params.blob_uid.trim().is_empty() {
            return Err(EngineError::Validation("blob_uid must not be empty".to_string()));
        }
        let meta = AppRef::new(namespace, name);
        self.require_app(&meta).await?;
        self.blobs.validate_for_stage(&meta, &params.blob_uid).await?;

        let builder_image = params
            .builder_image
            .as_deref()
            .map(str::trim)
            .filter(|image| !image.is_empty())
            .unwrap_or(&self.config.default_builder_image)
            .to_string();
        let record = self
            .pipeline
            .stage(&StageRequest {
                app: meta.clone(),
                blob_uid: params.blob_uid.clone(),
                builder_image,
            })
            .await?;
        info!(app = %meta, stage = %record.id, uid = %record.blob_uid, "stage started");
        Ok(record)
    }

    /// Roll the workload to a staged or pre-built image. The staged
    /// artifact is promoted only after the workload has been applied.
    pub async fn deploy(
        &self,
        namespace: &str,
        name: &str,
        params: &DeployParams,
    ) -> EngineResult<DeployOutcome> {
        let meta = AppRef::new(namespace, name);
        let app = self.require_app(&meta).await?;

        let (image, artifact) = match &params.stage_id {
            Some(stage_id) => {
                let stage = self
                    .pipeline
                    .get_stage(stage_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("stage", stage_id.as_str()))?;
                if stage.app != meta {
                    return Err(EngineError::OwnershipMismatch {
                        expected: meta.name.clone(),
                        found: stage.app.name.clone(),
                    });
                }
                (stage.image_url, Some(stage.blob_uid))
            }
            None => match params.image.as_deref().map(str::trim) {
                Some(image) if !image.is_empty() => (image.to_string(), None),
                _ => {
                    return Err(EngineError::Validation(
                        "an image is required when no stage id is given".to_string(),
                    ));
                }
            },
        };

        let workload = self
            .workloads
            .apply_workload(&WorkloadSpec {
                app: meta.clone(),
                image: image.clone(),
                replicas: app.instances,
                stage_id: params.stage_id.clone(),
                services: app.bound_services.clone(),
            })
            .await?;

        let update = ApplicationUpdate {
            origin: Some(params.origin.clone()),
            ..Default::default()
        };
        self.resources.update_application(&meta, &update).await?;
        let routes = self.reconciler.reconcile(&meta, &app.routes).await?;

        let promotion = match &artifact {
            Some(uid) => Some(self.blobs.promote(&meta, uid).await?),
            None => None,
        };
        info!(app = %meta, %image, replicas = app.instances, "application deployed");

        let application = self.require_app(&meta).await?;
        Ok(DeployOutcome {
            application,
            stage_id: params.stage_id.clone(),
            image,
            workload,
            routes,
            promotion,
        })
    }

    // ── Services ───────────────────────────────────────────────────

    pub async fn create_service(
        &self,
        namespace: &str,
        request: &ServiceCreateRequest,
    ) -> EngineResult<Service> {
        check_name("service", &request.name)?;
        self.require_namespace(namespace).await?;
        let service = Service::new(namespace, &request.name, request.data.clone());
        self.resources.create_service(&service).await.map_err(|e| match e {
            StoreError::AlreadyExists(_) => EngineError::Conflict(format!(
                "service '{}' already exists in namespace '{namespace}'",
                request.name
            )),
            other => other.into(),
        })?;
        info!(%namespace, service = %request.name, "service created");
        Ok(service)
    }

    pub async fn list_services(&self, namespace: &str) -> EngineResult<Vec<Service>> {
        self.require_namespace(namespace).await?;
        Ok(self.resources.list_services(namespace).await?)
    }

    pub async fn show_service(&self, namespace: &str, name: &str) -> EngineResult<ServiceDetails> {
        let service = self.require_service(namespace, name).await?;
        let bound_apps = self
            .resources
            .list_bound_applications(namespace, name)
            .await?
            .into_iter()
            .map(|app| app.name)
            .collect();
        Ok(ServiceDetails {
            service,
            bound_apps,
        })
    }

    /// Refused while bound unless `unbind` is set, in which case every
    /// bound application is unbound first.
    pub async fn delete_service(
        &self,
        namespace: &str,
        name: &str,
        unbind: bool,
    ) -> EngineResult<ServiceDeleted> {
        self.require_service(namespace, name).await?;
        let bound = self.resources.list_bound_applications(namespace, name).await?;
        let unbound_apps: Vec<String> = bound.iter().map(|app| app.name.clone()).collect();

        if !bound.is_empty() && !unbind {
            return Err(EngineError::Conflict(format!(
                "service '{name}' is bound to applications: {}",
                unbound_apps.join(", ")
            )));
        }
        for app in &bound {
            self.unbind_from(app, name).await?;
        }

        self.resources.delete_service(namespace, name).await?;
        info!(%namespace, service = %name, unbound = unbound_apps.len(), "service deleted");
        Ok(ServiceDeleted {
            service: name.to_string(),
            unbound_apps,
        })
    }

    pub async fn bind_service(
        &self,
        namespace: &str,
        service: &str,
        app: &str,
    ) -> EngineResult<BindingChanged> {
        self.require_service(namespace, service).await?;
        let meta = AppRef::new(namespace, app);
        let current = self.require_app(&meta).await?;
        if current.bound_services.contains(service) {
            return Err(EngineError::Conflict(format!(
                "service '{service}' is already bound to application '{app}'"
            )));
        }

        let mut services = current.bound_services;
        services.insert(service.to_string());
        let application = self.set_bound_services(&meta, services).await?;
        let restarted = self.restart_if_running(&meta).await?;
        info!(app = %meta, %service, restarted, "service bound");
        Ok(BindingChanged {
            application,
            service: service.to_string(),
            restarted,
        })
    }

    pub async fn unbind_service(
        &self,
        namespace: &str,
        service: &str,
        app: &str,
    ) -> EngineResult<BindingChanged> {
        self.require_service(namespace, service).await?;
        let meta = AppRef::new(namespace, app);
        let current = self.require_app(&meta).await?;
        if !current.bound_services.contains(service) {
            return Err(EngineError::Conflict(format!(
                "service '{service}' is not bound to application '{app}'"
            )));
        }
        self.unbind_from(&meta, service).await
    }

    async fn unbind_from(&self, meta: &AppRef, service: &str) -> EngineResult<BindingChanged> {
        let current = self
            .resources
            .get_application(meta)
            .await?
            .ok_or_else(|| EngineError::not_found("application", meta.to_string()))?;
        let mut services = current.bound_services;
        services.remove(service);
        let application = self.set_bound_services(meta, services).await?;
        let restarted = self.restart_if_running(meta).await?;
        info!(app = %meta, %service, restarted, "service unbound");
        Ok(BindingChanged {
            application,
            service: service.to_string(),
            restarted,
        })
    }

    /// Apply key removals and assignments, then restart running workloads
    /// bound to the service.
    pub async fn update_service(
        &self,
        namespace: &str,
        name: &str,
        update: &ServiceUpdate,
    ) -> EngineResult<ServiceUpdated> {
        self.require_namespace(namespace).await?;
        self.supervisor.on_service_updated(namespace, name, update).await
    }
}
