//! `ResourceStore` over the embedded tables.

use arbor_core::*;
use async_trait::async_trait;
use tracing::debug;

use crate::error::StateError;
use crate::store::StateStore;
use crate::tables::*;

fn app_prefix(app: &AppRef) -> String {
    format!("{}/", app.table_key())
}

fn service_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

#[async_trait]
impl ResourceStore for StateStore {
    // ── Namespaces ─────────────────────────────────────────────────

    async fn create_namespace(&self, name: &str) -> StoreResult<Namespace> {
        let namespace = Namespace {
            name: name.to_string(),
            created_at: epoch_secs(),
        };
        if !self.insert_new(NAMESPACES, name, &namespace)? {
            return Err(StateError::AlreadyExists(format!("namespace {name}")).into());
        }
        debug!(namespace = %name, "namespace stored");
        Ok(namespace)
    }

    async fn namespace_exists(&self, name: &str) -> StoreResult<bool> {
        let found: Option<Namespace> = self.get_json(NAMESPACES, name)?;
        Ok(found.is_some())
    }

    async fn list_namespaces(&self) -> StoreResult<Vec<Namespace>> {
        Ok(self.scan_json(NAMESPACES, "")?)
    }

    async fn delete_namespace(&self, name: &str) -> StoreResult<bool> {
        Ok(self.remove(NAMESPACES, name)?)
    }

    // ── Applications ───────────────────────────────────────────────

    async fn get_application(&self, app: &AppRef) -> StoreResult<Option<Application>> {
        Ok(self.get_json(APPLICATIONS, &app.table_key())?)
    }

    async fn create_application(&self, app: &Application) -> StoreResult<()> {
        let key = app.meta.table_key();
        if !self.insert_new(APPLICATIONS, &key, app)? {
            return Err(StateError::AlreadyExists(format!("application {key}")).into());
        }
        debug!(%key, "application stored");
        Ok(())
    }

    async fn update_application(
        &self,
        app: &AppRef,
        update: &ApplicationUpdate,
    ) -> StoreResult<Application> {
        let key = app.table_key();
        let updated = self.modify_json(APPLICATIONS, &key, |current: &mut Application| {
            update.apply_to(current)
        })?;
        updated.ok_or_else(|| StoreError::NotFound(format!("application {key}")))
    }

    async fn delete_application(&self, app: &AppRef) -> StoreResult<bool> {
        Ok(self.remove(APPLICATIONS, &app.table_key())?)
    }

    async fn list_applications(&self, scope: &Scope) -> StoreResult<Vec<Application>> {
        let prefix = match scope {
            Scope::Namespace(namespace) => format!("{namespace}/"),
            Scope::All => String::new(),
        };
        Ok(self.scan_json(APPLICATIONS, &prefix)?)
    }

    // ── Ingress rules ──────────────────────────────────────────────

    async fn list_ingress_rules(&self, app: &AppRef) -> StoreResult<Vec<IngressRule>> {
        Ok(self.scan_json(INGRESS_RULES, &app_prefix(app))?)
    }

    async fn create_or_update_ingress_rule(&self, rule: &IngressRule) -> StoreResult<()> {
        Ok(self.put_json(INGRESS_RULES, &rule.table_key(), rule)?)
    }

    async fn delete_ingress_rule(&self, app: &AppRef, route: &Route) -> StoreResult<bool> {
        let key = format!("{}{route}", app_prefix(app));
        Ok(self.remove(INGRESS_RULES, &key)?)
    }

    // ── Certificates ───────────────────────────────────────────────

    async fn get_certificate(&self, app: &AppRef) -> StoreResult<Option<Certificate>> {
        Ok(self.get_json(CERTIFICATES, &app.table_key())?)
    }

    async fn create_or_update_certificate(&self, cert: &Certificate) -> StoreResult<()> {
        Ok(self.put_json(CERTIFICATES, &cert.app.table_key(), cert)?)
    }

    async fn delete_certificate(&self, app: &AppRef) -> StoreResult<bool> {
        Ok(self.remove(CERTIFICATES, &app.table_key())?)
    }

    // ── Services ───────────────────────────────────────────────────

    async fn create_service(&self, service: &Service) -> StoreResult<()> {
        let key = service.table_key();
        if !self.insert_new(SERVICES, &key, service)? {
            return Err(StateError::AlreadyExists(format!("service {key}")).into());
        }
        debug!(%key, "service stored");
        Ok(())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> StoreResult<Option<Service>> {
        Ok(self.get_json(SERVICES, &service_key(namespace, name))?)
    }

    async fn update_service(
        &self,
        namespace: &str,
        name: &str,
        update: &ServiceUpdate,
    ) -> StoreResult<Service> {
        let key = service_key(namespace, name);
        let updated = self.modify_json(SERVICES, &key, |current: &mut Service| {
            update.apply_to(current)
        })?;
        updated.ok_or_else(|| StoreError::NotFound(format!("service {key}")))
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> StoreResult<bool> {
        Ok(self.remove(SERVICES, &service_key(namespace, name))?)
    }

    async fn list_services(&self, namespace: &str) -> StoreResult<Vec<Service>> {
        Ok(self.scan_json(SERVICES, &format!("{namespace}/"))?)
    }

    async fn list_bound_applications(
        &self,
        namespace: &str,
        service: &str,
    ) -> StoreResult<Vec<AppRef>> {
        let apps: Vec<Application> = self.scan_json(APPLICATIONS, &format!("{namespace}/"))?;
        Ok(apps
            .into_iter()
            .filter(|app| app.bound_services.contains(service))
            .map(|app| app.meta)
            .collect())
    }
}
