//! Trigger API tests

use std::sync::Arc;

use serde_json::Value;
use tokio::net::TcpListener;

use gitops_sync::server::serve::router;
use gitops_sync::server::state::ServerState;
use gitops_sync::upgrade::scheduler;
use gitops_sync::upgrade::UpgradeTask;

async fn spawn_server(state: ServerState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(Arc::new(state));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_upgrade_requests_are_queued() {
    let (queue, mut tasks) = scheduler::channel();
    let base = spawn_server(ServerState::new(queue)).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/upgrades/0.9", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);

    let response = client
        .post(format!("{}/upgrades/0.9/envs/3", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["env_id"], 3);

    assert_eq!(
        tasks.recv().await.unwrap(),
        UpgradeTask {
            version: "0.9".to_string(),
            env_id: None,
        }
    );
    assert_eq!(
        tasks.recv().await.unwrap(),
        UpgradeTask {
            version: "0.9".to_string(),
            env_id: Some(3),
        }
    );
}

#[tokio::test]
async fn test_closed_queue_is_reported() {
    let (queue, tasks) = scheduler::channel();
    drop(tasks);
    let base = spawn_server(ServerState::new(queue)).await;

    let response = reqwest::Client::new()
        .post(format!("{}/upgrades/1.0", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 503);
}

#[tokio::test]
async fn test_health_and_version() {
    let (queue, _tasks) = scheduler::channel();
    let base = spawn_server(ServerState::new(queue)).await;

    let health: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["service"], "gitops-sync");

    let version: Value = reqwest::get(format!("{}/version", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(version["version"], env!("CARGO_PKG_VERSION"));
}
