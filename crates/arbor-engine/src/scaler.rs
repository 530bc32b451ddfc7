//! Instance scaler.
//!
//! Requests carry the instance count as raw JSON so a value that is not an
//! integer at all is rejected as a request-shape error before the business
//! rule (non-negative) is checked.

use std::sync::Arc;

use arbor_core::{AppRef, ApplicationUpdate, ResourceStore, StoreError, WorkloadController};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

pub const NEGATIVE_INSTANCES: &str =
    "instances param should be an integer greater than or equal to zero";

/// Decode the raw `instances` value. Anything but a JSON integer is
/// malformed; range checks happen in [`validate_instances`].
pub fn parse_instances(raw: &Value) -> EngineResult<i64> {
    match raw {
        Value::Number(n) => n.as_i64().ok_or_else(|| {
            EngineError::Malformed(format!("instances: cannot decode {n} as an integer"))
        }),
        other => Err(EngineError::Malformed(format!(
            "instances: expected an integer, got {other}"
        ))),
    }
}

/// Reject negative counts. There is no upper bound beyond what the
/// workload primitive can represent.
pub fn validate_instances(requested: i64) -> EngineResult<u32> {
    if requested < 0 {
        return Err(EngineError::Validation(NEGATIVE_INSTANCES.to_string()));
    }
    u32::try_from(requested).map_err(|_| {
        EngineError::Validation(format!(
            "instances param {requested} exceeds the maximum of {}",
            u32::MAX
        ))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScaleOutcome {
    pub instances: u32,
    /// Whether a running workload was told about the new count. Without a
    /// workload the count applies at the next deploy.
    pub workload_updated: bool,
}

#[derive(Clone)]
pub struct InstanceScaler {
    resources: Arc<dyn ResourceStore>,
    workloads: Arc<dyn WorkloadController>,
}

impl InstanceScaler {
    pub fn new(resources: Arc<dyn ResourceStore>, workloads: Arc<dyn WorkloadController>) -> Self {
        Self {
            resources,
            workloads,
        }
    }

    /// Decode, validate, and apply a raw instance count.
    pub async fn scale(&self, app: &AppRef, raw: &Value) -> EngineResult<ScaleOutcome> {
        let instances = validate_instances(parse_instances(raw)?)?;
        self.apply(app, instances).await
    }

    /// Record the desired count. Does not wait for the workload to converge.
    pub async fn apply(&self, app: &AppRef, instances: u32) -> EngineResult<ScaleOutcome> {
        let update = ApplicationUpdate {
            instances: Some(instances),
            ..Default::default()
        };
        self.resources
            .update_application(app, &update)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => EngineError::not_found("application", app.to_string()),
                other => other.into(),
            })?;

        let workload_updated = self.workloads.set_desired_replicas(app, instances).await?;
        if workload_updated {
            info!(%app, instances, "desired replicas updated");
        } else {
            debug!(%app, instances, "no workload yet; instances recorded");
        }
        Ok(ScaleOutcome {
            instances,
            workload_updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{Application, WorkloadSpec, parse_routes};
    use arbor_state::StateStore;
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn negative_is_a_validation_error() {
        let err = validate_instances(parse_instances(&json!(-3)).unwrap()).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(err.to_string().contains("greater than or equal to zero"));
    }

    #[test]
    fn non_numeric_is_malformed() {
        for raw in [json!("abc"), json!(1.5), json!(null), json!([1])] {
            let err = parse_instances(&raw).unwrap_err();
            assert!(matches!(err, EngineError::Malformed(_)), "{raw}");
            assert!(!err.to_string().contains("greater than or equal to zero"));
        }
    }

    #[test]
    fn zero_and_large_counts_are_valid() {
        assert_eq!(validate_instances(0).unwrap(), 0);
        assert_eq!(validate_instances(10_000).unwrap(), 10_000);
        assert!(validate_instances(i64::from(u32::MAX) + 1).is_err());
    }

    #[tokio::test]
    async fn scale_updates_app_and_workload() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let foo = AppRef::new("ns", "foo");
        let app = Application::new(foo.clone(), parse_routes(&["foo.example.com"]).unwrap());
        store.create_application(&app).await.unwrap();
        let scaler = InstanceScaler::new(store.clone(), store.clone());

        let outcome = scaler.scale(&foo, &json!(3)).await.unwrap();
        assert!(!outcome.workload_updated);
        assert_eq!(store.get_application(&foo).await.unwrap().unwrap().instances, 3);

        store
            .apply_workload(&WorkloadSpec {
                app: foo.clone(),
                image: "img".to_string(),
                replicas: 3,
                stage_id: None,
                services: BTreeSet::new(),
            })
            .await
            .unwrap();
        let outcome = scaler.scale(&foo, &json!(0)).await.unwrap();
        assert!(outcome.workload_updated);
        let status = store.get_workload_status(&foo).await.unwrap().unwrap();
        assert_eq!(status.desired_replicas, 0);
    }

    #[tokio::test]
    async fn scale_missing_app_is_not_found() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let scaler = InstanceScaler::new(store.clone(), store);

        let err = scaler.scale(&AppRef::new("ns", "nope"), &json!(1)).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }
}
