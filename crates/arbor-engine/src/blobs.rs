//! Blob lifecycle: ownership checks before staging, promotion of the
//! deployed artifact, and garbage collection of superseded ones.
//!
//! Ownership lives in the artifact store and the active artifact on the
//! application record; nothing is kept in process memory.

use std::sync::Arc;

use arbor_core::{
    AppRef, ApplicationUpdate, ArtifactStore, BlobRecord, BlobUid, ResourceStore, Scope,
    StoreError,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// What happened to a superseded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum GcOutcome {
    Deleted { uid: BlobUid },
    AlreadyAbsent { uid: BlobUid },
    /// Still the active artifact of another application.
    Retained { uid: BlobUid, active_for: AppRef },
    /// Deletion failed; the artifact is left for a later sweep.
    Failed { uid: BlobUid, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromoteOutcome {
    pub active: BlobUid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded: Option<GcOutcome>,
}

#[derive(Clone)]
pub struct BlobManager {
    resources: Arc<dyn ResourceStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

/// Name used on both sides of a mismatch: bare when the namespaces agree.
fn owner_label(owner: &AppRef, relative_to: &AppRef) -> String {
    if owner.namespace == relative_to.namespace {
        owner.name.clone()
    } else {
        owner.to_string()
    }
}

impl BlobManager {
    pub fn new(resources: Arc<dyn ResourceStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            resources,
            artifacts,
        }
    }

    /// Store uploaded content and record `app` as its owner.
    pub async fn record_upload(&self, app: &AppRef, content: &[u8]) -> EngineResult<BlobRecord> {
        let record = self.artifacts.put_artifact(app, content).await?;
        info!(%app, uid = %record.uid, size = record.size_bytes, "artifact recorded");
        Ok(record)
    }

    /// Record a git repository reference as an artifact owned by `app`.
    pub async fn record_import(
        &self,
        app: &AppRef,
        url: &str,
        revision: Option<&str>,
    ) -> EngineResult<BlobRecord> {
        let record = self.artifacts.import_git(app, url, revision).await?;
        info!(%app, uid = %record.uid, %url, "git artifact recorded");
        Ok(record)
    }

    /// Refuse to stage an artifact owned by another application.
    pub async fn validate_for_stage(&self, app: &AppRef, uid: &str) -> EngineResult<()> {
        let owner = self
            .artifacts
            .get_artifact_owner(uid)
            .await?
            .ok_or_else(|| EngineError::not_found("blob", uid))?;

        if &owner != app {
            warn!(%app, %owner, %uid, "artifact owned by another application");
            return Err(EngineError::OwnershipMismatch {
                expected: owner_label(app, app),
                found: owner_label(&owner, app),
            });
        }
        Ok(())
    }

    /// Make `new_uid` the active artifact of `app` after a successful
    /// deploy, then collect the artifact it replaces.
    ///
    /// Collection problems are reported in the outcome, never as an error:
    /// the deploy they follow has already succeeded.
    pub async fn promote(&self, app: &AppRef, new_uid: &str) -> EngineResult<PromoteOutcome> {
        let previous = self
            .resources
            .get_application(app)
            .await?
            .ok_or_else(|| EngineError::not_found("application", app.to_string()))?
            .artifact;

        let update = ApplicationUpdate {
            artifact: Some(new_uid.to_string()),
            ..Default::default()
        };
        self.resources
            .update_application(app, &update)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => EngineError::not_found("application", app.to_string()),
                other => other.into(),
            })?;
        info!(%app, uid = %new_uid, "artifact promoted");

        let superseded = match previous {
            Some(old) if old != new_uid => Some(self.collect(&old).await),
            _ => None,
        };
        Ok(PromoteOutcome {
            active: new_uid.to_string(),
            superseded,
        })
    }

    /// Delete `uid` unless some application still has it active.
    pub async fn collect(&self, uid: &str) -> GcOutcome {
        match self.try_collect(uid).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%uid, error = %e, "artifact garbage collection failed");
                GcOutcome::Failed {
                    uid: uid.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn try_collect(&self, uid: &str) -> Result<GcOutcome, StoreError> {
        let apps = self.resources.list_applications(&Scope::All).await?;
        if let Some(app) = apps.iter().find(|a| a.artifact.as_deref() == Some(uid)) {
            debug!(%uid, active_for = %app.meta, "artifact still active; kept");
            return Ok(GcOutcome::Retained {
                uid: uid.to_string(),
                active_for: app.meta.clone(),
            });
        }

        let uid = uid.to_string();
        if self.artifacts.delete_artifact(&uid).await? {
            info!(%uid, "superseded artifact deleted");
            Ok(GcOutcome::Deleted { uid })
        } else {
            debug!(%uid, "superseded artifact already absent");
            Ok(GcOutcome::AlreadyAbsent { uid })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::{Application, parse_routes};
    use arbor_state::StateStore;

    async fn setup(apps: &[&str]) -> (Arc<StateStore>, BlobManager) {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        for name in apps {
            let app = Application::new(
                AppRef::new("ns", *name),
                parse_routes(&[format!("{name}.example.com")]).unwrap(),
            );
            store.create_application(&app).await.unwrap();
        }
        (store.clone(), BlobManager::new(store.clone(), store))
    }

    #[tokio::test]
    async fn owner_passes_validation() {
        let (_store, blobs) = setup(&["foo"]).await;
        let foo = AppRef::new("ns", "foo");
        let blob = blobs.record_upload(&foo, b"code").await.unwrap();

        blobs.validate_for_stage(&foo, &blob.uid).await.unwrap();
    }

    #[tokio::test]
    async fn other_app_is_a_mismatch() {
        let (_store, blobs) = setup(&["foo", "bar"]).await;
        let blob = blobs.record_upload(&AppRef::new("ns", "foo"), b"code").await.unwrap();

        let err = blobs
            .validate_for_stage(&AppRef::new("ns", "bar"), &blob.uid)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "blob app mismatch: expected: bar, found: foo");
    }

    #[tokio::test]
    async fn imported_repository_is_owned_like_an_upload() {
        let (_store, blobs) = setup(&["foo", "bar"]).await;
        let foo = AppRef::new("ns", "foo");
        let blob = blobs
            .record_import(&foo, "https://example.com/site.git", None)
            .await
            .unwrap();

        blobs.validate_for_stage(&foo, &blob.uid).await.unwrap();
        let err = blobs
            .validate_for_stage(&AppRef::new("ns", "bar"), &blob.uid)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "blob app mismatch: expected: bar, found: foo");
    }

    #[tokio::test]
    async fn cross_namespace_mismatch_is_qualified() {
        let (_store, blobs) = setup(&[]).await;
        let blob = blobs.record_upload(&AppRef::new("a", "foo"), b"code").await.unwrap();

        let err = blobs
            .validate_for_stage(&AppRef::new("b", "foo"), &blob.uid)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::OwnershipMismatch { ref expected, ref found }
                if expected == "foo" && found == "a/foo"
        ));
    }

    #[tokio::test]
    async fn unknown_blob_is_not_found() {
        let (_store, blobs) = setup(&["foo"]).await;
        let err = blobs
            .validate_for_stage(&AppRef::new("ns", "foo"), "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { kind: "blob", .. }));
    }

    #[tokio::test]
    async fn promote_collects_previous_artifact() {
        let (store, blobs) = setup(&["foo"]).await;
        let foo = AppRef::new("ns", "foo");
        let first = blobs.record_upload(&foo, b"v1").await.unwrap();
        let second = blobs.record_upload(&foo, b"v2").await.unwrap();

        let outcome = blobs.promote(&foo, &first.uid).await.unwrap();
        assert!(outcome.superseded.is_none());

        let outcome = blobs.promote(&foo, &second.uid).await.unwrap();
        assert_eq!(
            outcome.superseded,
            Some(GcOutcome::Deleted {
                uid: first.uid.clone()
            })
        );
        assert!(!store.artifact_exists(&first.uid).await.unwrap());
        assert!(store.artifact_exists(&second.uid).await.unwrap());
    }

    #[tokio::test]
    async fn re_promoting_same_artifact_keeps_it() {
        let (store, blobs) = setup(&["foo"]).await;
        let foo = AppRef::new("ns", "foo");
        let blob = blobs.record_upload(&foo, b"v1").await.unwrap();

        blobs.promote(&foo, &blob.uid).await.unwrap();
        let again = blobs.promote(&foo, &blob.uid).await.unwrap();
        assert!(again.superseded.is_none());
        assert!(store.artifact_exists(&blob.uid).await.unwrap());
    }

    #[tokio::test]
    async fn collect_tolerates_absent_and_keeps_active() {
        let (store, blobs) = setup(&["foo"]).await;
        let foo = AppRef::new("ns", "foo");
        let blob = blobs.record_upload(&foo, b"v1").await.unwrap();
        blobs.promote(&foo, &blob.uid).await.unwrap();

        assert!(matches!(blobs.collect(&blob.uid).await, GcOutcome::Retained { .. }));
        assert!(store.artifact_exists(&blob.uid).await.unwrap());

        assert_eq!(
            blobs.collect("gone").await,
            GcOutcome::AlreadyAbsent {
                uid: "gone".to_string()
            }
        );
    }
}
