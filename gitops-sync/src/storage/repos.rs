//! Store interfaces the engine depends on
//!
//! Each trait covers the handful of queries the reconciliation and upgrade
//! routines actually issue. Lookups that may legitimately miss return
//! `Option`; callers turn a miss into [`EngineError::LookupError`] when the
//! record is required.

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::storage::models::{
    Application, ApplicationInstance, ApplicationVersion, Branch, DevopsIngress, DevopsProject,
    DevopsService, Environment, IngressPath, Organization, Project, User,
};

#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Environment>, EngineError>;

    async fn get(&self, env_id: i64) -> Result<Option<Environment>, EngineError>;

    async fn update(&self, env: &Environment) -> Result<(), EngineError>;
}

#[async_trait]
pub trait InstanceStore: Send + Sync {
    async fn list_by_env(&self, env_id: i64) -> Result<Vec<ApplicationInstance>, EngineError>;

    /// Values override recorded for an application in one environment
    async fn env_values(&self, env_id: i64, app_id: i64) -> Result<Option<String>, EngineError>;
}

#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn get(&self, version_id: i64) -> Result<Option<ApplicationVersion>, EngineError>;
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Application>, EngineError>;

    async fn get(&self, app_id: i64) -> Result<Option<Application>, EngineError>;

    async fn update(&self, app: &Application) -> Result<(), EngineError>;
}

#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn list_by_env(&self, env_id: i64) -> Result<Vec<DevopsService>, EngineError>;

    async fn get(&self, service_id: i64) -> Result<Option<DevopsService>, EngineError>;

    async fn update(&self, service: &DevopsService) -> Result<(), EngineError>;

    /// Instances backing a service, in link order
    async fn backing_instances(&self, service_id: i64) -> Result<Vec<i64>, EngineError>;
}

#[async_trait]
pub trait IngressStore: Send + Sync {
    async fn list_by_env(&self, env_id: i64) -> Result<Vec<DevopsIngress>, EngineError>;

    /// Path records of an ingress in stored order
    async fn list_paths(&self, ingress_id: i64) -> Result<Vec<IngressPath>, EngineError>;
}

#[async_trait]
pub trait ResourceDetailStore: Send + Sync {
    /// Raw JSON of the last observed object of `kind`/`name` owned by an instance
    async fn observed(
        &self,
        instance_id: i64,
        kind: &str,
        name: &str,
    ) -> Result<Option<String>, EngineError>;
}

#[async_trait]
pub trait DevopsProjectStore: Send + Sync {
    async fn get(&self, project_id: i64) -> Result<Option<DevopsProject>, EngineError>;

    /// Projects that have no environment group yet
    async fn list_without_env_group(&self) -> Result<Vec<DevopsProject>, EngineError>;

    async fn update(&self, project: &DevopsProject) -> Result<(), EngineError>;
}

#[async_trait]
pub trait BranchStore: Send + Sync {
    async fn list_by_app(&self, app_id: i64) -> Result<Vec<Branch>, EngineError>;

    async fn create(&self, branch: &Branch) -> Result<(), EngineError>;
}

/// Organization, project and user directory
#[async_trait]
pub trait IamDirectory: Send + Sync {
    async fn project(&self, project_id: i64) -> Result<Option<Project>, EngineError>;

    async fn organization(&self, organization_id: i64) -> Result<Option<Organization>, EngineError>;

    async fn user_by_login_name(&self, login_name: &str) -> Result<Option<User>, EngineError>;
}

/// Turn a missed lookup into a [`EngineError::LookupError`]
pub fn required<T>(value: Option<T>, what: &str, id: impl std::fmt::Display) -> Result<T, EngineError> {
    value.ok_or_else(|| EngineError::LookupError(format!("{} {} not found", what, id)))
}
