//! `WorkloadController` over the `WORKLOADS` table.
//!
//! The embedded backend has no scheduler: an applied workload reports all
//! desired replicas ready at once. Restarts bump a generation counter the
//! way a cluster rollout-restart stamps the pod template.

use arbor_core::*;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::StateResult;
use crate::store::StateStore;
use crate::tables::WORKLOADS;
use crate::types::WorkloadRecord;

impl StateStore {
    /// Full stored workload record, including restart bookkeeping.
    pub fn workload_record(&self, app: &AppRef) -> StateResult<Option<WorkloadRecord>> {
        self.get_json(WORKLOADS, &app.table_key())
    }
}

#[async_trait]
impl WorkloadController for StateStore {
    async fn apply_workload(&self, spec: &WorkloadSpec) -> StoreResult<WorkloadStatus> {
        let key = spec.app.table_key();
        let now = epoch_secs();
        let updated = self.modify_json(WORKLOADS, &key, |record: &mut WorkloadRecord| {
            record.spec = spec.clone();
            record.status.image = spec.image.clone();
            record.status.desired_replicas = spec.replicas;
            record.status.ready_replicas = spec.replicas;
        })?;

        let record = match updated {
            Some(record) => record,
            None => {
                let record = WorkloadRecord {
                    spec: spec.clone(),
                    status: WorkloadStatus {
                        image: spec.image.clone(),
                        ready_replicas: spec.replicas,
                        desired_replicas: spec.replicas,
                        restarts: 0,
                        milli_cpus: 0,
                        memory_bytes: 0,
                        created_at: now,
                    },
                    restart_generation: 0,
                    restarted_at: None,
                };
                self.put_json(WORKLOADS, &key, &record)?;
                record
            }
        };
        info!(%key, image = %spec.image, replicas = spec.replicas, "workload applied");
        Ok(record.status)
    }

    async fn set_desired_replicas(&self, app: &AppRef, replicas: u32) -> StoreResult<bool> {
        let key = app.table_key();
        let updated = self.modify_json(WORKLOADS, &key, |record: &mut WorkloadRecord| {
            record.spec.replicas = replicas;
            record.status.desired_replicas = replicas;
            record.status.ready_replicas = replicas;
        })?;
        debug!(%key, replicas, found = updated.is_some(), "desired replicas set");
        Ok(updated.is_some())
    }

    async fn restart_workload(&self, app: &AppRef) -> StoreResult<()> {
        let key = app.table_key();
        let now = epoch_secs();
        let updated = self.modify_json(WORKLOADS, &key, |record: &mut WorkloadRecord| {
            record.restart_generation += 1;
            record.status.restarts = record.status.restarts.saturating_add(1);
            record.restarted_at = Some(now);
        })?;
        match updated {
            Some(record) => {
                info!(%key, generation = record.restart_generation, "workload restarted");
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("workload {key}"))),
        }
    }

    async fn get_workload_status(&self, app: &AppRef) -> StoreResult<Option<WorkloadStatus>> {
        Ok(self.workload_record(app)?.map(|record| record.status))
    }

    async fn delete_workload(&self, app: &AppRef) -> StoreResult<bool> {
        Ok(self.remove(WORKLOADS, &app.table_key())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn spec(replicas: u32, image: &str) -> WorkloadSpec {
        WorkloadSpec {
            app: AppRef::new("ns", "foo"),
            image: image.to_string(),
            replicas,
            stage_id: None,
            services: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn apply_creates_then_rolls() {
        let store = StateStore::open_in_memory().unwrap();
        let first = store.apply_workload(&spec(1, "img:v1")).await.unwrap();
        assert_eq!(first.summary(), "1/1");

        let second = store.apply_workload(&spec(3, "img:v2")).await.unwrap();
        assert_eq!(second.image, "img:v2");
        assert_eq!(second.desired_replicas, 3);
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn replicas_and_restart_require_workload() {
        let store = StateStore::open_in_memory().unwrap();
        let foo = AppRef::new("ns", "foo");

        assert!(!store.set_desired_replicas(&foo, 2).await.unwrap());
        assert!(matches!(
            store.restart_workload(&foo).await,
            Err(StoreError::NotFound(_))
        ));

        store.apply_workload(&spec(1, "img")).await.unwrap();
        assert!(store.set_desired_replicas(&foo, 0).await.unwrap());
        store.restart_workload(&foo).await.unwrap();

        let record = store.workload_record(&foo).unwrap().unwrap();
        assert_eq!(record.restart_generation, 1);
        assert!(record.restarted_at.is_some());
        assert!(!record.status.is_running());

        store.restart_workload(&foo).await.unwrap();
        let status = store.get_workload_status(&foo).await.unwrap().unwrap();
        assert_eq!(status.restarts, 2);
    }

    #[tokio::test]
    async fn delete_removes_status() {
        let store = StateStore::open_in_memory().unwrap();
        let foo = AppRef::new("ns", "foo");
        store.apply_workload(&spec(1, "img")).await.unwrap();

        assert!(store.delete_workload(&foo).await.unwrap());
        assert!(store.get_workload_status(&foo).await.unwrap().is_none());
    }
}
