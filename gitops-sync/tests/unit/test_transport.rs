//! Git transport tests against local repositories

mod common;

use common::seed_remote;
use git2::Repository;
use gitops_sync::errors::EngineError;
use gitops_sync::git::transport::{GitTransport, TemplateVersions, RENDER_COMMIT_MESSAGE};
use gitops_sync::git::tree::CommitAuthor;
use secrecy::SecretString;

fn author() -> CommitAuthor {
    CommitAuthor {
        name: "devops".to_string(),
        email: "devops@example.com".to_string(),
    }
}

#[tokio::test]
async fn test_template_clone_replaces_previous_checkout() {
    let dir = tempfile::tempdir().unwrap();
    let template = seed_remote(dir.path());
    let transport = GitTransport::new(dir.path().join("ws")).with_templates(TemplateVersions::default());

    let stale = transport.working_directory("tpl").join("stale.txt");
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, "old").unwrap();

    let tree = transport
        .clone_template("tpl", "MicroService", template.to_str().unwrap())
        .await
        .unwrap();

    assert_eq!(tree.path(), transport.working_directory("tpl").as_path());
    assert!(tree.file_exists("README.md").await);
    assert!(!stale.exists());
}

#[tokio::test]
async fn test_template_clone_of_missing_branch_fails() {
    let dir = tempfile::tempdir().unwrap();
    let template = seed_remote(dir.path());
    let transport = GitTransport::new(dir.path().join("ws")).with_templates(TemplateVersions {
        java_lib: "0.9.0".to_string(),
        ..Default::default()
    });

    let result = transport
        .clone_template("tpl", "JavaLib", template.to_str().unwrap())
        .await;

    assert!(matches!(result, Err(EngineError::TransportError(msg)) if msg.starts_with("error.git.clone")));
}

#[tokio::test]
async fn test_files_are_committed_with_configured_author() {
    let dir = tempfile::tempdir().unwrap();
    let remote = seed_remote(dir.path());
    let transport = GitTransport::new(dir.path().join("ws")).with_author(author());
    let tree = transport
        .clone_by_ssh(&dir.path().join("checkout"), remote.to_str().unwrap())
        .await
        .unwrap();

    transport
        .create_file_in_repo(&tree, "svc-web.yaml", "kind: Service\n", None)
        .await
        .unwrap();

    let repo = Repository::open(tree.path()).unwrap();
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    assert_eq!(head.message(), Some("[ADD] svc-web.yaml"));
    assert_eq!(head.author().name(), Some("devops"));
    assert_eq!(head.parent_count(), 1);
}

#[tokio::test]
async fn test_failed_push_still_removes_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let template = seed_remote(dir.path());
    let transport = GitTransport::new(dir.path().join("ws")).with_author(author());
    let tree = transport
        .clone_template("app", "MicroService", template.to_str().unwrap())
        .await
        .unwrap();
    std::fs::write(tree.path().join("values.yaml"), "name: app\n").unwrap();

    let result = transport
        .push(
            tree,
            "app",
            "http://127.0.0.1:1/acme/app.git",
            "root",
            &SecretString::from("token".to_string()),
            true,
        )
        .await;

    match result {
        Err(EngineError::TransportError(msg)) => {
            assert!(msg.starts_with("error.git.push"));
        }
        other => panic!("expected a transport error, got {:?}", other),
    }
    assert!(!transport.working_directory("app").exists());
    assert_eq!(RENDER_COMMIT_MESSAGE, "Render Variables[skip ci]");
}

#[tokio::test]
async fn test_uncommitted_file_is_not_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let transport = GitTransport::new(dir.path().join("ws"));
    let not_a_repo = gitops_sync::git::tree::WorkingTree::new(dir.path().join("plain"));
    std::fs::create_dir_all(not_a_repo.path()).unwrap();

    let result = transport
        .create_file_in_repo(&not_a_repo, "svc-web.yaml", "kind: Service\n", None)
        .await;

    assert!(result.is_err());
    assert!(!not_a_repo.file_exists("svc-web.yaml").await);
}
