//! Materializer tests against a local bare remote

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use gitops_sync::errors::EngineError;
use gitops_sync::checklog::{CheckLogRecorder, SUCCESS};
use gitops_sync::git::tags::AGENT_SYNC_TAG;
use gitops_sync::git::transport::GitTransport;
use gitops_sync::storage::models::{ApplicationInstance, ResourceStatus, ServiceInstanceLink};
use gitops_sync::storage::repos::{InstanceStore, ServiceStore};
use gitops_sync::storage::snapshot::SnapshotStore;

#[tokio::test]
async fn test_environment_is_materialized_and_pushed() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    let store = Arc::new(SnapshotStore::in_memory(web_snapshot()));
    let materializer = materializer(store, remote.clone(), &dir.path().join("ws"));

    let recorder = CheckLogRecorder::new();
    let reports = materializer.run(None, &recorder).await;

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(
        report.written,
        vec!["release-web.yaml", "svc-web-svc.yaml", "ing-web.yaml"]
    );
    assert!(report.failed.is_empty());
    assert!(report.tag_created);
    assert!(report.pushed);

    let ingress = remote_file(&remote, "ing-web.yaml").unwrap();
    assert!(ingress.contains("host: a.example.com"));
    assert!(ingress.contains("path: /api"));
    assert!(ingress.contains("serviceName: web-svc"));
    assert!(ingress.contains("servicePort: 80"));

    let release = remote_file(&remote, "release-web.yaml").unwrap();
    assert!(release.contains("chartName: web-app"));
    assert!(release.contains("http://charts.example.com/acme/shop"));

    assert_eq!(remote_tags(&remote), vec![AGENT_SYNC_TAG.to_string()]);
    // seed commit plus one per manifest
    assert_eq!(remote_commit_count(&remote), 4);

    let entries = recorder.snapshot();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.result == SUCCESS));
    assert_eq!(entries[2].content, "ingress: web serializable to yaml");
}

#[tokio::test]
async fn test_second_run_adds_no_commits() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    let store = Arc::new(SnapshotStore::in_memory(web_snapshot()));
    let materializer = materializer(store, remote.clone(), &dir.path().join("ws"));

    materializer.run(None, &CheckLogRecorder::new()).await;
    let commits = remote_commit_count(&remote);

    let recorder = CheckLogRecorder::new();
    let reports = materializer.run(None, &recorder).await;

    assert_eq!(remote_commit_count(&remote), commits);
    assert!(reports[0].written.is_empty());
    assert_eq!(reports[0].skipped.len(), 3);
    assert!(!reports[0].tag_created);
    assert!(recorder.is_empty());
}

#[tokio::test]
async fn test_failing_instance_does_not_stop_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    let mut snapshot = web_snapshot();
    snapshot.instances = vec![
        ApplicationInstance {
            id: 2,
            code: "x".to_string(),
            env_id: 1,
            app_id: 1,
            version_id: 99,
            ..Default::default()
        },
        ApplicationInstance {
            id: 3,
            code: "y".to_string(),
            env_id: 1,
            app_id: 1,
            version_id: 1,
            ..Default::default()
        },
    ];
    let store = Arc::new(SnapshotStore::in_memory(snapshot));
    let materializer = materializer(store, remote.clone(), &dir.path().join("ws"));

    let recorder = CheckLogRecorder::new();
    let reports = materializer.run(Some(1), &recorder).await;

    let entries = recorder.snapshot();
    assert_eq!(entries[0].content, "instance: x serializable to yaml");
    assert!(entries[0].result.starts_with("failed: "));
    assert!(entries[0].result.contains("99"));
    assert_eq!(entries[1].content, "instance: y serializable to yaml");
    assert_eq!(entries[1].result, SUCCESS);

    assert_eq!(reports[0].failed, vec!["release-x.yaml"]);
    assert!(remote_file(&remote, "release-y.yaml").is_some());
    assert!(remote_file(&remote, "release-x.yaml").is_none());
}

#[tokio::test]
async fn test_deleted_resources_are_left_out() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    let mut snapshot = web_snapshot();
    snapshot.instances[0].status = ResourceStatus::Deleted;
    snapshot.ingresses[0].status = ResourceStatus::Deleted;
    let store = Arc::new(SnapshotStore::in_memory(snapshot));
    let materializer = materializer(store, remote.clone(), &dir.path().join("ws"));

    let reports = materializer.run(None, &CheckLogRecorder::new()).await;

    assert_eq!(reports[0].written, vec!["svc-web-svc.yaml"]);
    assert!(remote_file(&remote, "release-web.yaml").is_none());
}

#[tokio::test]
async fn test_existing_tag_is_not_recreated() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    {
        let repo = git2::Repository::open_bare(&remote).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        repo.tag_lightweight(AGENT_SYNC_TAG, head.as_object(), false).unwrap();
    }
    let store = Arc::new(SnapshotStore::in_memory(web_snapshot()));
    let materializer = materializer(store, remote.clone(), &dir.path().join("ws"));

    let reports = materializer.run(None, &CheckLogRecorder::new()).await;

    assert!(!reports[0].tag_created);
    assert!(reports[0].pushed);
    assert_eq!(remote_commit_count(&remote), 4);
}

#[tokio::test]
async fn test_observed_port_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    let mut snapshot = web_snapshot();
    snapshot.services[0].ports = None;
    snapshot.service_instances = vec![ServiceInstanceLink {
        service_id: 5,
        instance_id: 1,
    }];
    snapshot.resource_details = vec![gitops_sync::storage::models::ResourceDetail {
        instance_id: 1,
        kind: "Service".to_string(),
        name: "web-svc".to_string(),
        message: r#"{"spec":{"ports":[{"name":"http","protocol":"TCP","port":80,"targetPort":8080}]}}"#
            .to_string(),
    }];
    let store = Arc::new(SnapshotStore::in_memory(snapshot));
    let materializer = materializer(store.clone(), remote.clone(), &dir.path().join("ws"));

    materializer.run(None, &CheckLogRecorder::new()).await;

    let service = ServiceStore::get(store.as_ref(), 5).await.unwrap().unwrap();
    let ports = service.ports.unwrap();
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].port, Some(80));
    assert_eq!(ports[0].target_port.as_deref(), Some("8080"));
    assert!(remote_file(&remote, "svc-web-svc.yaml")
        .unwrap()
        .contains("targetPort: 8080"));
}

#[tokio::test]
async fn test_environment_without_git_project_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    let mut snapshot = web_snapshot();
    snapshot.environments[0].gitlab_env_project_id = None;
    let store = Arc::new(SnapshotStore::in_memory(snapshot));
    let materializer = materializer(store, remote.clone(), &dir.path().join("ws"));

    let reports = materializer.run(None, &CheckLogRecorder::new()).await;

    assert!(reports.is_empty());
    assert_eq!(remote_commit_count(&remote), 1);
}

#[tokio::test]
async fn test_unknown_environment_is_recorded_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    let store = Arc::new(SnapshotStore::in_memory(web_snapshot()));
    let materializer = materializer(store, remote, &dir.path().join("ws"));

    let recorder = CheckLogRecorder::new();
    let reports = materializer.run(Some(42), &recorder).await;

    assert!(reports.is_empty());
    let entries = recorder.snapshot();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content, "env: 42 sync objects");
    assert!(entries[0].result.starts_with("failed: "));
}

#[tokio::test]
async fn test_pull_from_unreachable_remote_keeps_local_state() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    let transport = GitTransport::new(dir.path().join("ws"));
    let local = dir.path().join("checkout");
    let tree = transport
        .clone_by_ssh(&local, remote.to_str().unwrap())
        .await
        .unwrap();

    std::fs::remove_dir_all(&remote).unwrap();
    transport.pull_by_ssh(&local).await;

    assert!(tree.file_exists("README.md").await);
}

#[tokio::test]
async fn test_empty_environment_repository_gets_its_first_commits() {
    let dir = tempfile::tempdir().unwrap();
    let remote = dir.path().join("empty.git");
    git2::Repository::init_bare(&remote).unwrap();
    let store = Arc::new(SnapshotStore::in_memory(web_snapshot()));
    let materializer = materializer(store, remote.clone(), &dir.path().join("ws"));

    let recorder = CheckLogRecorder::new();
    let reports = materializer.run(None, &recorder).await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].written.len(), 3);
    assert!(reports[0].tag_created);
    assert!(reports[0].pushed);
    assert!(recorder.snapshot().iter().all(|e| e.result == SUCCESS));

    assert_eq!(remote_commit_count(&remote), 3);
    assert_eq!(remote_tags(&remote), vec![AGENT_SYNC_TAG.to_string()]);
    assert!(remote_file(&remote, "ing-web.yaml").is_some());

    // the next pass pulls the now populated remote and has nothing to add
    let reports = materializer.run(None, &CheckLogRecorder::new()).await;
    assert!(reports[0].written.is_empty());
    assert_eq!(remote_commit_count(&remote), 3);
}

struct UnavailableInstances;

#[async_trait]
impl InstanceStore for UnavailableInstances {
    async fn list_by_env(&self, _env_id: i64) -> Result<Vec<ApplicationInstance>, EngineError> {
        Err(EngineError::LookupError("instance table unavailable".to_string()))
    }

    async fn env_values(&self, _env_id: i64, _app_id: i64) -> Result<Option<String>, EngineError> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_unlisted_instances_do_not_hold_back_other_manifests() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    let store = Arc::new(SnapshotStore::in_memory(web_snapshot()));
    let materializer = materializer_with_instances(
        store,
        Arc::new(UnavailableInstances),
        remote.clone(),
        &dir.path().join("ws"),
    );

    let recorder = CheckLogRecorder::new();
    let reports = materializer.run(None, &recorder).await;

    let entries = recorder.snapshot();
    assert_eq!(entries[0].content, "instances: dev list");
    assert!(entries[0].result.contains("instance table unavailable"));
    assert_eq!(reports[0].written, vec!["svc-web-svc.yaml", "ing-web.yaml"]);
    assert!(reports[0].pushed);
    assert!(remote_file(&remote, "svc-web-svc.yaml").is_some());
    assert!(remote_file(&remote, "ing-web.yaml").is_some());
    assert_eq!(remote_tags(&remote), vec![AGENT_SYNC_TAG.to_string()]);
}
