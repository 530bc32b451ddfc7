//! Shared fixtures: an in-memory store behind a resource-store wrapper that
//! counts writes and fails selected calls.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arbor_core::*;
use arbor_engine::{Collaborators, ControlPlane};
use arbor_state::StateStore;
use async_trait::async_trait;

#[derive(Default)]
pub struct Faults {
    /// Application whose deletion fails.
    pub delete_app: Option<String>,
    /// Host whose ingress rule cannot be created.
    pub ingress_host: Option<String>,
}

pub struct FaultyStore {
    pub inner: Arc<StateStore>,
    pub faults: Mutex<Faults>,
    writes: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: Arc<StateStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Faults::default()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Ingress and certificate writes issued so far.
    pub fn route_writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceStore for FaultyStore {
    async fn create_namespace(&self, name: &str) -> StoreResult<Namespace> {
        self.inner.create_namespace(name).await
    }
    async fn namespace_exists(&self, name: &str) -> StoreResult<bool> {
        self.inner.namespace_exists(name).await
    }
    async fn list_namespaces(&self) -> StoreResult<Vec<Namespace>> {
        self.inner.list_namespaces().await
    }
    async fn delete_namespace(&self, name: &str) -> StoreResult<bool> {
        self.inner.delete_namespace(name).await
    }

    async fn get_application(&self, app: &AppRef) -> StoreResult<Option<Application>> {
        self.inner.get_application(app).await
    }
    async fn create_application(&self, app: &Application) -> StoreResult<()> {
        self.inner.create_application(app).await
    }
    async fn update_application(
        &self,
        app: &AppRef,
        update: &ApplicationUpdate,
    ) -> StoreResult<Application> {
        self.inner.update_application(app, update).await
    }
    async fn delete_application(&self, app: &AppRef) -> StoreResult<bool> {
        let refuse = self.faults.lock().unwrap().delete_app.clone();
        if refuse.as_deref() == Some(app.name.as_str()) {
            return Err(StoreError::backend(format!("permission denied deleting {app}")));
        }
        self.inner.delete_application(app).await
    }
    async fn list_applications(&self, scope: &Scope) -> StoreResult<Vec<Application>> {
        self.inner.list_applications(scope).await
    }

    async fn list_ingress_rules(&self, app: &AppRef) -> StoreResult<Vec<IngressRule>> {
        self.inner.list_ingress_rules(app).await
    }
    async fn create_or_update_ingress_rule(&self, rule: &IngressRule) -> StoreResult<()> {
        let refuse = self.faults.lock().unwrap().ingress_host.clone();
        if refuse.as_deref() == Some(rule.route.host()) {
            return Err(StoreError::backend("ingress admission webhook rejected rule"));
        }
        self.wrote();
        self.inner.create_or_update_ingress_rule(rule).await
    }
    async fn delete_ingress_rule(&self, app: &AppRef, route: &Route) -> StoreResult<bool> {
        self.wrote();
        self.inner.delete_ingress_rule(app, route).await
    }

    async fn get_certificate(&self, app: &AppRef) -> StoreResult<Option<Certificate>> {
        self.inner.get_certificate(app).await
    }
    async fn create_or_update_certificate(&self, cert: &Certificate) -> StoreResult<()> {
        self.wrote();
        self.inner.create_or_update_certificate(cert).await
    }
    async fn delete_certificate(&self, app: &AppRef) -> StoreResult<bool> {
        self.wrote();
        self.inner.delete_certificate(app).await
    }

    async fn create_service(&self, service: &Service) -> StoreResult<()> {
        self.inner.create_service(service).await
    }
    async fn get_service(&self, namespace: &str, name: &str) -> StoreResult<Option<Service>> {
        self.inner.get_service(namespace, name).await
    }
    async fn update_service(
        &self,
        namespace: &str,
        name: &str,
        update: &ServiceUpdate,
    ) -> StoreResult<Service> {
        self.inner.update_service(namespace, name, update).await
    }
    async fn delete_service(&self, namespace: &str, name: &str) -> StoreResult<bool> {
        self.inner.delete_service(namespace, name).await
    }
    async fn list_services(&self, namespace: &str) -> StoreResult<Vec<Service>> {
        self.inner.list_services(namespace).await
    }
    async fn list_bound_applications(
        &self,
        namespace: &str,
        service: &str,
    ) -> StoreResult<Vec<AppRef>> {
        self.inner.list_bound_applications(namespace, service).await
    }
}

pub struct Harness {
    pub store: Arc<StateStore>,
    pub resources: Arc<FaultyStore>,
    pub plane: ControlPlane,
}

/// Control plane over an in-memory store, domain `example.com`, with
/// namespace `ns` already created.
pub async fn harness(config: EngineConfig) -> Harness {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let resources = Arc::new(FaultyStore::new(store.clone()));
    let collaborators = Collaborators {
        resources: resources.clone(),
        ..Collaborators::from_backend(store.clone())
    };
    let plane = ControlPlane::new(config, collaborators);
    plane.create_namespace("ns").await.unwrap();
    Harness {
        store,
        resources,
        plane,
    }
}

pub fn config() -> EngineConfig {
    EngineConfig {
        domain: "example.com".to_string(),
        ..Default::default()
    }
}
