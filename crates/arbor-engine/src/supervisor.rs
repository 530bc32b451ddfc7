//! Service-binding change supervisor.
//!
//! After a backing service changes, every bound application with a running
//! workload is restarted so mounted credentials are re-read. Restarts run
//! with bounded concurrency and never abort early: each failure is recorded
//! and the remaining applications are still attempted.

use std::collections::HashMap;
use std::sync::Arc;

use arbor_core::{AppRef, ResourceStore, Service, ServiceUpdate, StoreError, WorkloadController};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartFailure {
    pub app: AppRef,
    pub reason: String,
}

/// Per-application outcome of a restart sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SupervisorReport {
    pub restarted: Vec<AppRef>,
    /// Bound applications without a running workload.
    pub skipped: Vec<AppRef>,
    pub failed: Vec<RestartFailure>,
}

impl SupervisorReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn sort(&mut self) {
        self.restarted.sort();
        self.skipped.sort();
        self.failed.sort_by(|a, b| a.app.cmp(&b.app));
    }
}

/// The updated service and what happened to its bound workloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceUpdated {
    pub service: Service,
    pub restarts: SupervisorReport,
}

enum Restart {
    Done,
    Skipped,
    Failed(String),
}

#[derive(Clone)]
pub struct ServiceSupervisor {
    resources: Arc<dyn ResourceStore>,
    workloads: Arc<dyn WorkloadController>,
    concurrency: usize,
}

impl ServiceSupervisor {
    pub fn new(
        resources: Arc<dyn ResourceStore>,
        workloads: Arc<dyn WorkloadController>,
        concurrency: usize,
    ) -> Self {
        Self {
            resources,
            workloads,
            concurrency: concurrency.max(1),
        }
    }

    /// Apply `update` to the service, then restart the running workloads
    /// bound to it. The service write completes before any restart starts.
    pub async fn on_service_updated(
        &self,
        namespace: &str,
        name: &str,
        update: &ServiceUpdate,
    ) -> EngineResult<ServiceUpdated> {
        let service = self
            .resources
            .update_service(namespace, name, update)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => {
                    EngineError::not_found("service", format!("{namespace}/{name}"))
                }
                other => other.into(),
            })?;
        info!(
            %namespace,
            service = %name,
            removed = update.remove.len(),
            set = update.set.len(),
            "service updated"
        );

        let bound = self.resources.list_bound_applications(namespace, name).await?;
        let restarts = self.restart_running(bound).await;
        Ok(ServiceUpdated { service, restarts })
    }

    /// Restart each application whose workload is running.
    pub async fn restart_running(&self, apps: Vec<AppRef>) -> SupervisorReport {
        let slots = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut owners = HashMap::new();

        for app in apps {
            let workloads = self.workloads.clone();
            let slots = slots.clone();
            let task_app = app.clone();
            let handle = tasks.spawn(async move {
                match slots.acquire_owned().await {
                    Ok(_permit) => restart_if_running(workloads.as_ref(), &task_app).await,
                    Err(e) => Restart::Failed(e.to_string()),
                }
            });
            owners.insert(handle.id(), app);
        }

        let mut report = SupervisorReport::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome),
                Err(e) => {
                    warn!(error = %e, "restart task panicked");
                    (e.id(), Restart::Failed(format!("restart task panicked: {e}")))
                }
            };
            let Some(app) = owners.remove(&id) else {
                continue;
            };
            match outcome {
                Restart::Done => report.restarted.push(app),
                Restart::Skipped => report.skipped.push(app),
                Restart::Failed(reason) => report.failed.push(RestartFailure { app, reason }),
            }
        }
        report.sort();

        info!(
            restarted = report.restarted.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "bound workloads processed"
        );
        report
    }
}

async fn restart_if_running(workloads: &dyn WorkloadController, app: &AppRef) -> Restart {
    let status = match workloads.get_workload_status(app).await {
        Ok(status) => status,
        Err(e) => {
            warn!(%app, error = %e, "workload status unavailable");
            return Restart::Failed(e.to_string());
        }
    };
    if !status.is_some_and(|s| s.is_running()) {
        debug!(%app, "no running workload; restart skipped");
        return Restart::Skipped;
    }
    match workloads.restart_workload(app).await {
        Ok(()) => {
            debug!(%app, "workload restarted");
            Restart::Done
        }
        Err(e) => {
            warn!(%app, error = %e, "workload restart failed");
            Restart::Failed(e.to_string())
        }
    }
}
