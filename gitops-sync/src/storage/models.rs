//! Records read from and written to the relational side of the system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status shared by instances, services and ingresses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    #[default]
    Running,
    Operating,
    Stopped,
    Failed,
    Deleted,
}

impl ResourceStatus {
    pub fn is_deleted(&self) -> bool {
        matches!(self, ResourceStatus::Deleted)
    }
}

/// Deployment environment backed by one git project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Environment {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub project_id: i64,

    /// Git project holding the environment's manifests; `None` until bootstrapped
    pub gitlab_env_project_id: Option<i64>,

    /// Private half of the SSH keypair used for the environment repository
    pub env_id_rsa: Option<String>,

    pub env_id_rsa_pub: Option<String>,
}

impl Environment {
    pub fn has_keypair(&self) -> bool {
        self.env_id_rsa.as_deref().is_some_and(|k| !k.trim().is_empty())
            && self.env_id_rsa_pub.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationInstance {
    pub id: i64,
    pub code: String,
    pub status: ResourceStatus,
    pub env_id: i64,
    pub app_id: i64,
    pub version_id: i64,
}

impl ApplicationInstance {
    pub fn manifest_file(&self) -> String {
        format!("release-{}.yaml", self.code)
    }
}

/// Published chart version of an application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationVersion {
    pub id: i64,
    pub app_id: i64,
    pub version: String,

    /// Chart repository path relative to the helm base URL
    pub repository: String,

    /// Default values shipped with the chart
    pub values: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Application {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub project_id: i64,
    pub gitlab_project_id: Option<i64>,
    pub hook_id: Option<i64>,

    /// Secret token echoed back by webhook deliveries
    pub token: Option<String>,
}

/// Environment-specific values override for one application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceValues {
    pub env_id: i64,
    pub app_id: i64,
    pub values: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortMap {
    pub name: Option<String>,
    pub protocol: Option<String>,
    pub port: Option<i64>,
    pub target_port: Option<String>,
    pub node_port: Option<i64>,
}

/// Network service managed inside an environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevopsService {
    pub id: i64,
    pub env_id: i64,
    pub name: String,
    pub status: ResourceStatus,

    /// JSON object of annotations
    pub annotations: Option<String>,

    /// JSON object used as the pod selector
    pub labels: Option<String>,

    /// Comma-separated external IPs
    pub external_ip: Option<String>,

    pub ports: Option<Vec<PortMap>>,
}

impl DevopsService {
    pub fn manifest_file(&self) -> String {
        format!("svc-{}.yaml", self.name)
    }
}

/// Links a service to an instance backing it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceInstanceLink {
    pub service_id: i64,
    pub instance_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevopsIngress {
    pub id: i64,
    pub env_id: i64,
    pub name: String,
    pub domain: String,
    pub cert_name: Option<String>,
    pub status: ResourceStatus,
}

impl DevopsIngress {
    pub fn manifest_file(&self) -> String {
        format!("ing-{}.yaml", self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngressPath {
    pub id: i64,
    pub ingress_id: i64,
    pub path: String,
    pub service_id: i64,
    pub service_port: i64,
}

/// Last observed cluster object reported for an instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceDetail {
    pub instance_id: i64,
    pub kind: String,
    pub name: String,

    /// Raw JSON of the observed object
    pub message: String,
}

/// Git groups owned by a project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevopsProject {
    pub project_id: i64,
    pub app_group_id: Option<i64>,
    pub env_group_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub organization_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Organization {
    pub id: i64,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: i64,
    pub login_name: String,
}

/// Branch record mirrored from the git service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Branch {
    pub app_id: i64,
    pub branch_name: String,
    pub last_commit: String,
    pub last_commit_date: Option<DateTime<Utc>>,
    pub last_commit_msg: Option<String>,
    pub last_commit_user: Option<i64>,
    pub checkout_commit: String,
    pub checkout_date: Option<DateTime<Utc>>,
}
