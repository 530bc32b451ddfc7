//! End-to-end behaviour of the control plane over the embedded store.

mod common;

use std::collections::BTreeSet;

use arbor_core::*;
use arbor_engine::*;
use common::{config, harness};
use tokio::sync::watch;

fn create(name: &str, routes: &[&str]) -> AppCreateRequest {
    AppCreateRequest {
        name: name.to_string(),
        routes: routes.iter().map(|r| r.to_string()).collect(),
    }
}

fn hosts(cert: &Certificate) -> Vec<&str> {
    cert.dns_names.iter().map(String::as_str).collect()
}

#[tokio::test]
async fn routes_follow_application_updates() {
    let h = harness(config()).await;
    let foo = AppRef::new("ns", "foo");

    h.plane.create_application("ns", &create("foo", &[])).await.unwrap();
    let rules = h.store.list_ingress_rules(&foo).await.unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].route.to_string(), "foo.example.com");
    let cert = h.store.get_certificate(&foo).await.unwrap().unwrap();
    assert_eq!(hosts(&cert), vec!["foo.example.com"]);

    let update = AppUpdateRequest {
        routes: Some(vec!["a.org".to_string(), "b.org".to_string()]),
        instances: None,
    };
    h.plane.update_application("ns", "foo", &update).await.unwrap();

    let rules = h.store.list_ingress_rules(&foo).await.unwrap();
    let routes: BTreeSet<String> = rules.iter().map(|r| r.route.to_string()).collect();
    assert_eq!(routes, BTreeSet::from(["a.org".to_string(), "b.org".to_string()]));
    let cert = h.store.get_certificate(&foo).await.unwrap().unwrap();
    assert_eq!(cert.name, "foo-tls");
    assert_eq!(hosts(&cert), vec!["a.org", "b.org"]);
}

#[tokio::test]
async fn reconciling_same_routes_twice_writes_nothing() {
    let h = harness(config()).await;
    h.plane.create_application("ns", &create("foo", &[])).await.unwrap();

    let update = AppUpdateRequest {
        routes: Some(vec!["b.org".to_string(), "a.org/".to_string()]),
        instances: None,
    };
    h.plane.update_application("ns", "foo", &update).await.unwrap();
    let after_first = h.resources.route_writes();

    let reordered = AppUpdateRequest {
        routes: Some(vec!["https://A.org".to_string(), "b.org".to_string()]),
        instances: None,
    };
    let second = h.plane.update_application("ns", "foo", &reordered).await.unwrap();

    assert!(second.routes.unwrap().is_noop());
    assert_eq!(h.resources.route_writes(), after_first);
}

#[tokio::test]
async fn redeploy_collects_superseded_artifact_and_guards_ownership() {
    let h = harness(config()).await;
    h.plane.create_application("ns", &create("foo", &[])).await.unwrap();
    h.plane.create_application("ns", &create("bar", &[])).await.unwrap();

    let mut deployed = Vec::new();
    for content in [&b"v1"[..], &b"v2"[..]] {
        let blob = h.plane.upload("ns", "foo", content).await.unwrap();
        let stage = h
            .plane
            .stage(
                "ns",
                "foo",
                &StageParams {
                    blob_uid: blob.uid.clone(),
                    builder_image: None,
                },
            )
            .await
            .unwrap();
        let params = DeployParams {
            stage_id: Some(stage.id),
            image: None,
            origin: AppOrigin::Path {
                path: "/src/foo".to_string(),
            },
        };
        h.plane.deploy("ns", "foo", &params).await.unwrap();
        deployed.push(blob.uid);
    }

    let (u1, u2) = (&deployed[0], &deployed[1]);
    assert!(!h.store.artifact_exists(u1).await.unwrap());
    assert!(h.store.artifact_exists(u2).await.unwrap());
    assert_eq!(h.store.read_artifact(u2).unwrap().unwrap(), b"v2");

    let details = h.plane.show_application("ns", "foo").await.unwrap();
    assert_eq!(details.application.artifact.as_deref(), Some(u2.as_str()));

    // U2 still exists and belongs to foo.
    let err = h
        .plane
        .stage(
            "ns",
            "bar",
            &StageParams {
                blob_uid: u2.clone(),
                builder_image: None,
            },
        )
        .await
        .unwrap_err();
    match err {
        EngineError::OwnershipMismatch { expected, found } => {
            assert_eq!(expected, "bar");
            assert_eq!(found, "foo");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn staging_with_collected_artifact_is_not_found() {
    let h = harness(config()).await;
    h.plane.create_application("ns", &create("foo", &[])).await.unwrap();
    h.plane.create_application("ns", &create("bar", &[])).await.unwrap();

    let old = h.plane.upload("ns", "foo", b"v1").await.unwrap();
    let new = h.plane.upload("ns", "foo", b"v2").await.unwrap();
    for uid in [&old.uid, &new.uid] {
        let stage = h
            .plane
            .stage("ns", "foo", &StageParams { blob_uid: uid.clone(), builder_image: None })
            .await
            .unwrap();
        let params = DeployParams {
            stage_id: Some(stage.id),
            image: None,
            origin: AppOrigin::Path { path: ".".to_string() },
        };
        h.plane.deploy("ns", "foo", &params).await.unwrap();
    }

    let err = h
        .plane
        .stage("ns", "bar", &StageParams { blob_uid: old.uid, builder_image: None })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { kind: "blob", .. }));
}

#[tokio::test]
async fn namespace_teardown_reports_one_error_and_finishes_the_rest() {
    let h = harness(config()).await;
    for i in 0..100 {
        let name = format!("app-{i:03}");
        h.plane.create_application("ns", &create(&name, &[])).await.unwrap();
    }
    h.resources.faults.lock().unwrap().delete_app = Some("app-042".to_string());

    let err = h.plane.delete_namespace("ns", None).await.unwrap_err();
    assert!(matches!(err, EngineError::Dependency(_)));
    assert!(err.to_string().contains("app-042"));

    let left = h
        .store
        .list_applications(&Scope::Namespace("ns".to_string()))
        .await
        .unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].meta.name, "app-042");
    assert!(h.store.namespace_exists("ns").await.unwrap());

    // Retry once the fault clears.
    h.resources.faults.lock().unwrap().delete_app = None;
    let deleted = h.plane.delete_namespace("ns", None).await.unwrap();
    assert_eq!(deleted.applications, 1);
    assert!(!h.store.namespace_exists("ns").await.unwrap());
}

#[tokio::test]
async fn namespace_teardown_removes_services_after_applications() {
    let h = harness(config()).await;
    h.plane.create_application("ns", &create("web", &[])).await.unwrap();
    h.plane
        .create_service(
            "ns",
            &ServiceCreateRequest {
                name: "db".to_string(),
                data: Default::default(),
            },
        )
        .await
        .unwrap();
    h.plane.bind_service("ns", "db", "web").await.unwrap();

    let deleted = h.plane.delete_namespace("ns", None).await.unwrap();
    assert_eq!((deleted.applications, deleted.services), (1, 1));
    assert!(h.store.get_service("ns", "db").await.unwrap().is_none());
    assert!(matches!(
        h.plane.list_applications(&Scope::Namespace("ns".to_string())).await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn cancelled_teardown_dispatches_nothing_new() {
    let h = harness(EngineConfig {
        bulk_concurrency: 2,
        ..config()
    })
    .await;
    for i in 0..10 {
        h.plane
            .create_application("ns", &create(&format!("app-{i}"), &[]))
            .await
            .unwrap();
    }

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let err = h.plane.delete_namespace("ns", Some(rx)).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));

    let left = h.store.list_applications(&Scope::All).await.unwrap();
    assert_eq!(left.len(), 10);
    assert!(h.store.namespace_exists("ns").await.unwrap());
}

#[tokio::test]
async fn failed_route_write_reports_applied_and_pending() {
    let h = harness(config()).await;
    h.plane.create_application("ns", &create("foo", &["a.org"])).await.unwrap();
    h.resources.faults.lock().unwrap().ingress_host = Some("c.org".to_string());

    let update = AppUpdateRequest {
        routes: Some(vec!["b.org".to_string(), "c.org".to_string()]),
        instances: None,
    };
    let err = h.plane.update_application("ns", "foo", &update).await.unwrap_err();
    match err {
        EngineError::PartialReconcile { applied, failed, .. } => {
            assert_eq!(applied.len(), 2);
            assert!(matches!(
                &failed[0],
                RouteOp::CreateIngress { route } if route.host() == "c.org"
            ));
            assert!(matches!(failed.last(), Some(RouteOp::UpdateCertificate { .. })));
        }
        other => panic!("unexpected {other:?}"),
    }

    // Retrying after the fault clears converges.
    h.resources.faults.lock().unwrap().ingress_host = None;
    let retry = h.plane.update_application("ns", "foo", &update).await.unwrap();
    let report = retry.routes.unwrap();
    assert_eq!(report.diff.to_add.len(), 1);
    assert_eq!(report.diff.unchanged.len(), 1);
    let cert = h.store.get_certificate(&AppRef::new("ns", "foo")).await.unwrap().unwrap();
    assert_eq!(hosts(&cert), vec!["b.org", "c.org"]);
}

#[tokio::test]
async fn service_update_restarts_running_bound_apps() {
    let h = harness(config()).await;
    for name in ["web", "worker", "idle"] {
        h.plane.create_application("ns", &create(name, &[])).await.unwrap();
    }
    h.plane
        .create_service(
            "ns",
            &ServiceCreateRequest {
                name: "db".to_string(),
                data: Default::default(),
            },
        )
        .await
        .unwrap();
    for name in ["web", "idle"] {
        h.plane.bind_service("ns", "db", name).await.unwrap();
    }
    let image = DeployParams {
        stage_id: None,
        image: Some("img".to_string()),
        origin: AppOrigin::Container {
            image: "img".to_string(),
        },
    };
    h.plane.deploy("ns", "web", &image).await.unwrap();
    h.plane.deploy("ns", "worker", &image).await.unwrap();

    let update = ServiceUpdate {
        remove: vec![],
        set: [("password".to_string(), "rotated".to_string())].into(),
    };
    let outcome = h.plane.update_service("ns", "db", &update).await.unwrap();

    assert_eq!(outcome.restarts.restarted, vec![AppRef::new("ns", "web")]);
    assert_eq!(outcome.restarts.skipped, vec![AppRef::new("ns", "idle")]);
    assert!(outcome.restarts.is_clean());
    let worker = h.store.workload_record(&AppRef::new("ns", "worker")).unwrap().unwrap();
    assert_eq!(worker.restart_generation, 0);
}
