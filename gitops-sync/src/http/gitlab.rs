//! Git service (GitLab API v4) operations used by the upgrade routines

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::EngineError;
use crate::http::client::HttpClient;

/// Administrator account the upgrade acts as
pub const ADMIN_USER_ID: i64 = 1;

const HTTP_CREATED: u16 = 201;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewGroup {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
}

/// Outcome of a group creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupCreation {
    Created(Group),
    /// Any answer other than `201 Created`
    Rejected { status: u16, headers: String, body: String },
}

/// Request to create a project inside a group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitlabProjectPayload {
    pub group_id: i64,
    pub user_id: i64,
    pub path: String,
    pub organization_id: Option<i64>,
    #[serde(rename = "type")]
    pub project_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitlabProject {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectHook {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub push_events: bool,
    #[serde(default)]
    pub tag_push_events: bool,
    #[serde(default)]
    pub merge_requests_events: bool,
    #[serde(default)]
    pub pipeline_events: bool,
    #[serde(default)]
    pub job_events: bool,
    #[serde(default)]
    pub enable_ssl_verification: bool,
}

impl ProjectHook {
    /// Hook subscribed to every event the platform consumes
    pub fn all_events(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            id: None,
            url: url.into(),
            token,
            push_events: true,
            tag_push_events: true,
            merge_requests_events: true,
            pipeline_events: true,
            job_events: true,
            enable_ssl_verification: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteBranch {
    pub name: String,
    pub commit: RemoteCommit,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteCommit {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub committed_date: Option<DateTime<FixedOffset>>,
}

/// Git service operations
#[async_trait]
pub trait GitlabService: Send + Sync {
    async fn create_group(&self, group: &NewGroup, user_id: i64) -> Result<GroupCreation, EngineError>;

    async fn create_project(&self, payload: &GitlabProjectPayload) -> Result<GitlabProject, EngineError>;

    async fn create_webhook(
        &self,
        project_id: i64,
        user_id: i64,
        hook: &ProjectHook,
    ) -> Result<ProjectHook, EngineError>;

    async fn update_webhook(
        &self,
        project_id: i64,
        hook_id: i64,
        user_id: i64,
        hook: &ProjectHook,
    ) -> Result<ProjectHook, EngineError>;

    async fn list_branches(&self, project_id: i64, user_id: i64) -> Result<Vec<RemoteBranch>, EngineError>;
}

/// [`GitlabService`] over the GitLab REST API
pub struct GitlabClient {
    http: HttpClient,
}

impl GitlabClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[derive(Serialize)]
struct CreateProjectRequest<'a> {
    name: &'a str,
    path: &'a str,
    namespace_id: i64,
}

#[async_trait]
impl GitlabService for GitlabClient {
    async fn create_group(&self, group: &NewGroup, user_id: i64) -> Result<GroupCreation, EngineError> {
        let response = self.http.post_raw("/groups", Some(user_id), group).await?;
        if response.status != HTTP_CREATED {
            return Ok(GroupCreation::Rejected {
                status: response.status,
                headers: response.headers,
                body: response.body,
            });
        }
        let created: Group = serde_json::from_str(&response.body)?;
        info!("Created group {} ({})", created.path, created.id);
        Ok(GroupCreation::Created(created))
    }

    async fn create_project(&self, payload: &GitlabProjectPayload) -> Result<GitlabProject, EngineError> {
        let request = CreateProjectRequest {
            name: &payload.path,
            path: &payload.path,
            namespace_id: payload.group_id,
        };
        self.http.post("/projects", Some(payload.user_id), &request).await
    }

    async fn create_webhook(
        &self,
        project_id: i64,
        user_id: i64,
        hook: &ProjectHook,
    ) -> Result<ProjectHook, EngineError> {
        let path = format!("/projects/{}/hooks", project_id);
        self.http.post(&path, Some(user_id), hook).await
    }

    async fn update_webhook(
        &self,
        project_id: i64,
        hook_id: i64,
        user_id: i64,
        hook: &ProjectHook,
    ) -> Result<ProjectHook, EngineError> {
        let path = format!("/projects/{}/hooks/{}", project_id, hook_id);
        self.http.put(&path, Some(user_id), hook).await
    }

    async fn list_branches(&self, project_id: i64, user_id: i64) -> Result<Vec<RemoteBranch>, EngineError> {
        let path = format!("/projects/{}/repository/branches", project_id);
        self.http.get(&path, Some(user_id)).await
    }
}
