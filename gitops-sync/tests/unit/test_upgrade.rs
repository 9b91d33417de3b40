//! Upgrade routine and scheduler tests

mod common;

use std::sync::Arc;

use chrono::DateTime;
use common::*;
use gitops_sync::checklog::store::{CheckLogStore, FileCheckLogStore};
use gitops_sync::checklog::{CheckLogRecorder, SUCCESS};
use gitops_sync::filesys::file::File;
use gitops_sync::http::gitlab::{RemoteBranch, RemoteCommit};
use gitops_sync::storage::models::{
    Application, Branch, DevopsProject, Environment, Organization, Project, User,
};
use gitops_sync::storage::repos::{ApplicationStore, DevopsProjectStore, EnvironmentStore};
use gitops_sync::storage::snapshot::{Snapshot, SnapshotStore};
use gitops_sync::upgrade::scheduler::{self, UpgradeTask};
use gitops_sync::upgrade::{execute, run_version};

fn iam_snapshot() -> Snapshot {
    Snapshot {
        organizations: vec![Organization {
            id: 1,
            code: "acme".to_string(),
            name: "Acme".to_string(),
        }],
        projects: vec![Project {
            id: 2,
            code: "shop".to_string(),
            name: "Shop".to_string(),
            organization_id: 1,
        }],
        devops_projects: vec![DevopsProject {
            project_id: 2,
            app_group_id: Some(30),
            env_group_id: None,
        }],
        ..Default::default()
    }
}

fn bootstrap_snapshot() -> Snapshot {
    let mut snapshot = web_snapshot();
    let iam = iam_snapshot();
    snapshot.organizations = iam.organizations;
    snapshot.projects = iam.projects;
    snapshot.devops_projects = iam.devops_projects;
    snapshot.environments = vec![Environment {
        id: 1,
        code: "dev".to_string(),
        name: "Dev".to_string(),
        project_id: 2,
        ..Default::default()
    }];
    snapshot
}

#[tokio::test]
async fn test_0_9_bootstraps_group_project_and_manifests() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    let store = Arc::new(SnapshotStore::in_memory(bootstrap_snapshot()));
    let gitlab = Arc::new(MockGitlab::default());
    let saga = Arc::new(MockSaga::default());
    let materializer = materializer(store.clone(), remote.clone(), &dir.path().join("ws"));
    let ctx = upgrade_context(store.clone(), gitlab.clone(), saga.clone(), materializer);

    let recorder = CheckLogRecorder::new();
    run_version(&ctx, "0.9", None, &recorder).await;

    assert_eq!(
        gitlab.calls(),
        vec![
            "create_group Acme-Shop-gitops acme-shop-gitops as 1",
            "create_project dev in 40 type ENV",
        ]
    );
    assert_eq!(*saga.started.lock().unwrap(), vec!["devops-upgrade-0.9"]);

    let project = DevopsProjectStore::get(store.as_ref(), 2).await.unwrap().unwrap();
    assert_eq!(project.env_group_id, Some(40));

    let env = EnvironmentStore::get(store.as_ref(), 1).await.unwrap().unwrap();
    assert_eq!(env.gitlab_env_project_id, Some(101));
    assert!(env.has_keypair());
    assert_eq!(env.env_id_rsa_pub.as_deref(), Some("ssh-rsa AAAA acme/shop/dev"));

    let entries = recorder.snapshot();
    assert_eq!(entries[0].content, "project: Shop create gitops group");
    assert_eq!(entries[1].content, "env: Dev create gitops project");
    assert!(entries.iter().all(|e| e.result == SUCCESS));
    assert!(remote_file(&remote, "ing-web.yaml").is_some());
}

#[tokio::test]
async fn test_0_9_rejected_group_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    let store = Arc::new(SnapshotStore::in_memory(bootstrap_snapshot()));
    let gitlab = Arc::new(MockGitlab {
        reject_groups: true,
        ..Default::default()
    });
    let materializer = materializer(store.clone(), remote, &dir.path().join("ws"));
    let ctx = upgrade_context(store.clone(), gitlab, Arc::new(MockSaga::default()), materializer);

    let recorder = CheckLogRecorder::new();
    run_version(&ctx, "0.9", None, &recorder).await;

    let entries = recorder.snapshot();
    assert_eq!(entries[0].content, "project: Shop create gitops group");
    assert!(entries[0]
        .result
        .contains("create group response error! Header:"));
    assert!(entries[0].result.contains("has already been taken"));

    // without a group the environment project cannot be created
    assert_eq!(entries[1].content, "env: Dev create gitops project");
    assert!(entries[1].result.starts_with("failed: "));
    let env = EnvironmentStore::get(store.as_ref(), 1).await.unwrap().unwrap();
    assert!(env.gitlab_env_project_id.is_none());
    // the keypair is still kept for the next attempt
    assert!(env.has_keypair());
}

#[tokio::test]
async fn test_0_8_creates_webhooks_and_branch_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut snapshot = iam_snapshot();
    snapshot.applications = vec![
        Application {
            id: 1,
            code: "web".to_string(),
            name: "Web".to_string(),
            project_id: 2,
            gitlab_project_id: Some(7),
            token: Some("hook-token".to_string()),
            ..Default::default()
        },
        Application {
            id: 2,
            code: "legacy".to_string(),
            name: "Legacy".to_string(),
            project_id: 2,
            ..Default::default()
        },
    ];
    snapshot.users = vec![User {
        id: 3,
        login_name: "alice".to_string(),
    }];
    snapshot.branches = vec![Branch {
        app_id: 1,
        branch_name: "master".to_string(),
        last_commit: "abc".to_string(),
        ..Default::default()
    }];
    let store = Arc::new(SnapshotStore::in_memory(snapshot));
    let gitlab = Arc::new(MockGitlab {
        branches: vec![
            RemoteBranch {
                name: "master".to_string(),
                commit: RemoteCommit {
                    id: "abc".to_string(),
                    message: None,
                    author_name: None,
                    committed_date: None,
                },
            },
            RemoteBranch {
                name: "feature".to_string(),
                commit: RemoteCommit {
                    id: "def".to_string(),
                    message: Some("wip".to_string()),
                    author_name: Some("alice".to_string()),
                    committed_date: DateTime::parse_from_rfc3339("2018-06-28T03:44:20-07:00").ok(),
                },
            },
        ],
        ..Default::default()
    });
    let materializer = materializer(store.clone(), seed_remote(dir.path()), &dir.path().join("ws"));
    let ctx = upgrade_context(store.clone(), gitlab.clone(), Arc::new(MockSaga::default()), materializer);

    let recorder = CheckLogRecorder::new();
    run_version(&ctx, "0.8", None, &recorder).await;

    assert_eq!(
        gitlab.calls(),
        vec![
            "create_webhook 7 http://gateway.example.com/devops/webhook",
            "list_branches 7",
        ]
    );
    let app = ApplicationStore::get(store.as_ref(), 1).await.unwrap().unwrap();
    assert_eq!(app.hook_id, Some(99));

    let branches = store.snapshot().branches;
    assert_eq!(branches.len(), 2);
    assert_eq!(branches[1].branch_name, "feature");
    assert_eq!(branches[1].last_commit_user, Some(3));
    assert_eq!(branches[1].checkout_commit, "def");
    assert!(branches[1].last_commit_date.is_some());

    let entries = recorder.snapshot();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].content, "app: Web create gitlab webhook");
    assert_eq!(entries[1].content, "app: Web sync branches");
    assert!(entries.iter().all(|e| e.result == SUCCESS));
}

#[tokio::test]
async fn test_1_0_refreshes_existing_webhooks() {
    let dir = tempfile::tempdir().unwrap();
    let mut snapshot = iam_snapshot();
    snapshot.applications = vec![Application {
        id: 1,
        code: "web".to_string(),
        name: "Web".to_string(),
        project_id: 2,
        gitlab_project_id: Some(7),
        hook_id: Some(12),
        ..Default::default()
    }];
    let store = Arc::new(SnapshotStore::in_memory(snapshot));
    let gitlab = Arc::new(MockGitlab::default());
    let materializer = materializer(store.clone(), seed_remote(dir.path()), &dir.path().join("ws"));
    let ctx = upgrade_context(store, gitlab.clone(), Arc::new(MockSaga::default()), materializer);

    let recorder = CheckLogRecorder::new();
    run_version(&ctx, "1.0", None, &recorder).await;

    assert_eq!(
        gitlab.calls(),
        vec!["update_webhook 7 12 http://gateway.example.com/devops/webhook"]
    );
    assert_eq!(recorder.snapshot()[0].content, "app: Web update gitlab webhook");
}

#[tokio::test]
async fn test_unknown_version_persists_an_empty_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SnapshotStore::in_memory(iam_snapshot()));
    let gitlab = Arc::new(MockGitlab::default());
    let materializer = materializer(store.clone(), seed_remote(dir.path()), &dir.path().join("ws"));
    let ctx = upgrade_context(store, gitlab.clone(), Arc::new(MockSaga::default()), materializer);
    let check_logs = FileCheckLogStore::new(File::new(dir.path().join("check-logs.jsonl")));

    let task = UpgradeTask {
        version: "0.7".to_string(),
        env_id: None,
    };
    let batch = tokio_test::assert_ok!(execute(&ctx, &check_logs, &task).await);

    assert_eq!(batch.log, "[]");
    assert!(batch.begin_check_date <= batch.end_check_date);
    assert!(gitlab.calls().is_empty());
    assert_eq!(check_logs.list().await.unwrap(), vec![batch]);
}

#[tokio::test]
async fn test_worker_runs_queued_tasks_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    let store = Arc::new(SnapshotStore::in_memory(web_snapshot()));
    let materializer = materializer(store.clone(), remote, &dir.path().join("ws"));
    let ctx = Arc::new(upgrade_context(
        store,
        Arc::new(MockGitlab::default()),
        Arc::new(MockSaga::default()),
        materializer,
    ));
    let check_logs = Arc::new(FileCheckLogStore::new(File::new(
        dir.path().join("check-logs.jsonl"),
    )));

    let (queue, tasks) = scheduler::channel();
    let worker = tokio::spawn(scheduler::run(
        ctx,
        check_logs.clone(),
        tasks,
        Box::pin(std::future::pending::<()>()),
    ));

    queue.check_log("1.0").unwrap();
    queue.check_log_by_env("0.7", 1).unwrap();
    drop(queue);
    worker.await.unwrap();

    assert_eq!(check_logs.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_shutdown_drains_queued_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SnapshotStore::in_memory(iam_snapshot()));
    let materializer = materializer(store.clone(), seed_remote(dir.path()), &dir.path().join("ws"));
    let ctx = Arc::new(upgrade_context(
        store,
        Arc::new(MockGitlab::default()),
        Arc::new(MockSaga::default()),
        materializer,
    ));
    let check_logs = Arc::new(FileCheckLogStore::new(File::new(
        dir.path().join("check-logs.jsonl"),
    )));

    let (queue, tasks) = scheduler::channel();
    queue.check_log("0.7").unwrap();
    queue.check_log("0.6").unwrap();

    // already resolved: the worker shuts down right away but still runs both
    scheduler::run(ctx, check_logs.clone(), tasks, Box::pin(async {})).await;

    assert_eq!(check_logs.list().await.unwrap().len(), 2);
    assert!(queue.check_log("1.0").is_err());
}
