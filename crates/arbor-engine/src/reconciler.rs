//! Route reconciler: drives ingress rules and the per-application
//! certificate toward a desired route set.
//!
//! The "previous" state is always read from the resource store, never
//! cached, so reconciling the same desired set twice issues no writes.

use std::collections::BTreeSet;
use std::sync::Arc;

use arbor_core::{AppRef, Certificate, IngressRule, ResourceStore, Route};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// Set difference between two route sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteDiff {
    pub to_add: BTreeSet<Route>,
    pub to_remove: BTreeSet<Route>,
    pub unchanged: BTreeSet<Route>,
}

impl RouteDiff {
    pub fn between(old: &BTreeSet<Route>, new: &BTreeSet<Route>) -> Self {
        Self {
            to_add: new.difference(old).cloned().collect(),
            to_remove: old.difference(new).cloned().collect(),
            unchanged: new.intersection(old).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// A single write against the resource store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RouteOp {
    CreateIngress { route: Route },
    DeleteIngress { route: Route },
    /// Create or replace the certificate with exactly these DNS names.
    UpdateCertificate { dns_names: BTreeSet<String> },
    DeleteCertificate,
}

/// Outcome of a fully applied reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub diff: RouteDiff,
    pub applied: Vec<RouteOp>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Hostnames a certificate must carry to cover `routes`.
fn dns_names(routes: &BTreeSet<Route>) -> BTreeSet<String> {
    routes.iter().map(|r| r.host().to_string()).collect()
}

/// Compute the writes that take the live state to `desired`.
///
/// Certificate DNS names are derived from the whole desired set, so a host
/// shared by two routes survives the removal of one of them.
pub fn plan(
    diff: &RouteDiff,
    current_cert: Option<&Certificate>,
    desired: &BTreeSet<Route>,
) -> Vec<RouteOp> {
    let mut ops: Vec<RouteOp> = diff
        .to_remove
        .iter()
        .map(|route| RouteOp::DeleteIngress {
            route: route.clone(),
        })
        .collect();
    ops.extend(diff.to_add.iter().map(|route| RouteOp::CreateIngress {
        route: route.clone(),
    }));

    let wanted = dns_names(desired);
    match current_cert {
        Some(_) if wanted.is_empty() => ops.push(RouteOp::DeleteCertificate),
        Some(cert) if cert.dns_names == wanted => {}
        None if wanted.is_empty() => {}
        _ => ops.push(RouteOp::UpdateCertificate { dns_names: wanted }),
    }
    ops
}

#[derive(Clone)]
pub struct RouteReconciler {
    store: Arc<dyn ResourceStore>,
}

impl RouteReconciler {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Routes currently backed by ingress rules for `app`.
    pub async fn live_routes(&self, app: &AppRef) -> EngineResult<BTreeSet<Route>> {
        let rules = self.store.list_ingress_rules(app).await?;
        Ok(rules.into_iter().map(|rule| rule.route).collect())
    }

    /// Reconcile `app` to `desired`. Stops at the first failing write and
    /// reports what was and was not applied; nothing is rolled back.
    pub async fn reconcile(
        &self,
        app: &AppRef,
        desired: &BTreeSet<Route>,
    ) -> EngineResult<ReconcileReport> {
        let live = self.live_routes(app).await?;
        let cert = self.store.get_certificate(app).await?;
        let diff = RouteDiff::between(&live, desired);
        let ops = plan(&diff, cert.as_ref(), desired);

        if ops.is_empty() {
            debug!(%app, routes = desired.len(), "routes already reconciled");
            return Ok(ReconcileReport {
                diff,
                applied: Vec::new(),
            });
        }

        let mut applied = Vec::with_capacity(ops.len());
        let mut pending = ops.into_iter();
        while let Some(op) = pending.next() {
            if let Err(e) = self.apply(app, &op).await {
                warn!(%app, ?op, error = %e, "route operation failed; aborting plan");
                let mut failed = vec![op];
                failed.extend(pending);
                return Err(EngineError::PartialReconcile {
                    applied,
                    failed,
                    reason: e.to_string(),
                });
            }
            applied.push(op);
        }

        info!(
            %app,
            added = diff.to_add.len(),
            removed = diff.to_remove.len(),
            unchanged = diff.unchanged.len(),
            "routes reconciled"
        );
        Ok(ReconcileReport { diff, applied })
    }

    async fn apply(&self, app: &AppRef, op: &RouteOp) -> Result<(), arbor_core::StoreError> {
        match op {
            RouteOp::CreateIngress { route } => {
                self.store
                    .create_or_update_ingress_rule(&IngressRule::for_route(app, route))
                    .await
            }
            RouteOp::DeleteIngress { route } => {
                // Already gone counts as done.
                self.store.delete_ingress_rule(app, route).await.map(|_| ())
            }
            RouteOp::UpdateCertificate { dns_names } => {
                self.store
                    .create_or_update_certificate(&Certificate::new(app, dns_names.clone()))
                    .await
            }
            RouteOp::DeleteCertificate => self.store.delete_certificate(app).await.map(|_| ()),
        }
    }
}
