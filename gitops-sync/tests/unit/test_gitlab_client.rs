//! GitLab client tests against a local mock API

use std::sync::{Arc, Mutex};

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use gitops_sync::http::client::HttpClient;
use gitops_sync::http::gitlab::{
    GitlabClient, GitlabProjectPayload, GitlabService, GroupCreation, NewGroup, ProjectHook,
    ADMIN_USER_ID,
};
use gitops_sync::http::saga::{HttpSagaTrigger, SagaTrigger, UPGRADE_0_9_SAGA};

#[derive(Default)]
struct Seen {
    requests: Mutex<Vec<String>>,
}

type Shared = Arc<Seen>;

fn remember(seen: &Shared, headers: &HeaderMap, what: String) {
    let token = headers
        .get("PRIVATE-TOKEN")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    let sudo = headers.get("Sudo").and_then(|v| v.to_str().ok()).unwrap_or("-");
    seen.requests
        .lock()
        .unwrap()
        .push(format!("{} token={} sudo={}", what, token, sudo));
}

async fn create_group(
    State(seen): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    remember(&seen, &headers, format!("POST /groups {}", body["path"]));
    if body["path"] == "taken" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "Failed to save group"})),
        );
    }
    (
        StatusCode::CREATED,
        Json(json!({"id": 40, "name": body["name"], "path": body["path"]})),
    )
}

async fn create_project(
    State(seen): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    remember(
        &seen,
        &headers,
        format!("POST /projects {} ns={}", body["path"], body["namespace_id"]),
    );
    (StatusCode::CREATED, Json(json!({"id": 101, "name": body["name"]})))
}

async fn create_hook(
    State(seen): State<Shared>,
    headers: HeaderMap,
    Path(project_id): Path<i64>,
    Json(mut body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    remember(&seen, &headers, format!("POST /projects/{}/hooks", project_id));
    body["id"] = json!(99);
    (StatusCode::CREATED, Json(body))
}

async fn update_hook(
    State(seen): State<Shared>,
    headers: HeaderMap,
    Path((project_id, hook_id)): Path<(i64, i64)>,
    Json(mut body): Json<Value>,
) -> Json<Value> {
    remember(
        &seen,
        &headers,
        format!("PUT /projects/{}/hooks/{}", project_id, hook_id),
    );
    body["id"] = json!(hook_id);
    Json(body)
}

async fn branches(Path(project_id): Path<i64>) -> Result<Json<Value>, StatusCode> {
    if project_id != 7 {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(json!([
        {"name": "master", "commit": {"id": "abc", "author_name": "alice",
            "committed_date": "2018-06-28T03:44:20-07:00", "message": "init"}}
    ])))
}

async fn start_saga(
    State(seen): State<Shared>,
    headers: HeaderMap,
    Path(code): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    remember(&seen, &headers, format!("POST saga {} input={}", code, body["input"]));
    Json(json!({"id": 1, "sagaCode": code}))
}

async fn spawn_api() -> (String, Shared) {
    let seen: Shared = Arc::new(Seen::default());
    let app = Router::new()
        .route("/api/v4/groups", post(create_group))
        .route("/api/v4/projects", post(create_project))
        .route("/api/v4/projects/{id}/hooks", post(create_hook))
        .route("/api/v4/projects/{id}/hooks/{hook_id}", put(update_hook))
        .route("/api/v4/projects/{id}/repository/branches", get(branches))
        .route("/v1/sagas/instances/{code}", post(start_saga))
        .with_state(seen.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), seen)
}

fn client(base: &str) -> GitlabClient {
    let http = HttpClient::new(&format!("{}/api/v4/", base))
        .unwrap()
        .with_private_token(SecretString::from("glpat-test".to_string()));
    GitlabClient::new(http)
}

#[tokio::test]
async fn test_group_creation_outcomes() {
    let (base, seen) = spawn_api().await;
    let gitlab = client(&base);

    let created = gitlab
        .create_group(
            &NewGroup {
                name: "Acme-Shop-gitops".to_string(),
                path: "acme-shop-gitops".to_string(),
            },
            ADMIN_USER_ID,
        )
        .await
        .unwrap();
    match created {
        GroupCreation::Created(group) => {
            assert_eq!(group.id, 40);
            assert_eq!(group.path, "acme-shop-gitops");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let rejected = gitlab
        .create_group(
            &NewGroup {
                name: "Taken".to_string(),
                path: "taken".to_string(),
            },
            ADMIN_USER_ID,
        )
        .await
        .unwrap();
    match rejected {
        GroupCreation::Rejected { status, body, .. } => {
            assert_eq!(status, 400);
            assert!(body.contains("Failed to save group"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    let requests = seen.requests.lock().unwrap().clone();
    assert_eq!(
        requests[0],
        "POST /groups \"acme-shop-gitops\" token=glpat-test sudo=1"
    );
}

#[tokio::test]
async fn test_project_and_hooks() {
    let (base, seen) = spawn_api().await;
    let gitlab = client(&base);

    let project = gitlab
        .create_project(&GitlabProjectPayload {
            group_id: 40,
            user_id: ADMIN_USER_ID,
            path: "dev".to_string(),
            organization_id: None,
            project_type: "ENV".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(project.id, 101);

    let hook = ProjectHook::all_events("http://gw/devops/webhook", Some("t".to_string()));
    let created = gitlab.create_webhook(7, ADMIN_USER_ID, &hook).await.unwrap();
    assert_eq!(created.id, Some(99));
    assert!(created.push_events);

    let updated = gitlab.update_webhook(7, 12, ADMIN_USER_ID, &hook).await.unwrap();
    assert_eq!(updated.id, Some(12));

    let requests = seen.requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec![
            "POST /projects \"dev\" ns=40 token=glpat-test sudo=1",
            "POST /projects/7/hooks token=glpat-test sudo=1",
            "PUT /projects/7/hooks/12 token=glpat-test sudo=1",
        ]
    );
}

#[tokio::test]
async fn test_branch_listing_and_errors() {
    let (base, _seen) = spawn_api().await;
    let gitlab = client(&base);

    let branches = gitlab.list_branches(7, ADMIN_USER_ID).await.unwrap();
    assert_eq!(branches.len(), 1);
    assert_eq!(branches[0].commit.author_name.as_deref(), Some("alice"));

    let missing = gitlab.list_branches(8, ADMIN_USER_ID).await;
    assert!(matches!(
        missing,
        Err(gitops_sync::errors::EngineError::RemoteProvisioningError(_))
    ));
}

#[tokio::test]
async fn test_saga_start_posts_empty_input() {
    let (base, seen) = spawn_api().await;
    let saga = HttpSagaTrigger::new(HttpClient::new(&base).unwrap());

    saga.start(UPGRADE_0_9_SAGA, "{}").await.unwrap();

    let requests = seen.requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec!["POST saga devops-upgrade-0.9 input=\"{}\" token=- sudo=-"]
    );
}
