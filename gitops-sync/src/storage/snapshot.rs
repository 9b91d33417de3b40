//! JSON snapshot store
//!
//! Holds every record in memory behind one lock and, when backed by a file,
//! rewrites the whole snapshot after each mutation.

use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::storage::models::{
    Application, ApplicationInstance, ApplicationVersion, Branch, DevopsIngress, DevopsProject,
    DevopsService, Environment, IngressPath, InstanceValues, Organization, Project, ResourceDetail,
    ServiceInstanceLink, User,
};
use crate::storage::repos::{
    ApplicationStore, BranchStore, DevopsProjectStore, EnvironmentStore, IamDirectory,
    IngressStore, InstanceStore, ResourceDetailStore, ServiceStore, VersionStore,
};

/// Serialized form of the whole store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    pub environments: Vec<Environment>,
    pub instances: Vec<ApplicationInstance>,
    pub instance_values: Vec<InstanceValues>,
    pub versions: Vec<ApplicationVersion>,
    pub applications: Vec<Application>,
    pub services: Vec<DevopsService>,
    pub service_instances: Vec<ServiceInstanceLink>,
    pub ingresses: Vec<DevopsIngress>,
    pub ingress_paths: Vec<IngressPath>,
    pub resource_details: Vec<ResourceDetail>,
    pub devops_projects: Vec<DevopsProject>,
    pub projects: Vec<Project>,
    pub organizations: Vec<Organization>,
    pub users: Vec<User>,
    pub branches: Vec<Branch>,
}

/// In-memory store implementing every record trait
pub struct SnapshotStore {
    data: RwLock<Snapshot>,
    file: Option<File>,
    // serializes snapshot file rewrites
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    /// Store that lives only in memory
    pub fn in_memory(snapshot: Snapshot) -> Self {
        Self {
            data: RwLock::new(snapshot),
            file: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Load a store from `file`, starting empty when the file does not exist
    pub async fn load(file: File) -> Result<Self, EngineError> {
        let snapshot = if file.exists().await {
            let snapshot: Snapshot = file.read_json().await?;
            info!(
                "Loaded snapshot from {} ({} environments)",
                file.path().display(),
                snapshot.environments.len()
            );
            snapshot
        } else {
            info!("No snapshot at {}, starting empty", file.path().display());
            Snapshot::default()
        };
        Ok(Self {
            data: RwLock::new(snapshot),
            file: Some(file),
            write_lock: Mutex::new(()),
        })
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> Snapshot {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        data.clone()
    }

    fn read<T>(&self, f: impl FnOnce(&Snapshot) -> T) -> T {
        let data = self.data.read().unwrap_or_else(|e| e.into_inner());
        f(&data)
    }

    async fn mutate<T>(&self, f: impl FnOnce(&mut Snapshot) -> Result<T, EngineError>) -> Result<T, EngineError> {
        let _write = self.write_lock.lock().await;
        let (result, copy) = {
            let mut data = self.data.write().unwrap_or_else(|e| e.into_inner());
            let result = f(&mut data)?;
            let copy = self.file.as_ref().map(|_| data.clone());
            (result, copy)
        };
        if let (Some(file), Some(copy)) = (&self.file, copy) {
            file.write_json(&copy).await?;
            debug!("Snapshot written to {}", file.path().display());
        }
        Ok(result)
    }
}

fn replace_where<T: Clone>(
    items: &mut [T],
    record: &T,
    matches: impl Fn(&T) -> bool,
    what: &str,
) -> Result<(), EngineError> {
    match items.iter_mut().find(|item| matches(item)) {
        Some(slot) => {
            *slot = record.clone();
            Ok(())
        }
        None => Err(EngineError::StoreError(format!("{} to update does not exist", what))),
    }
}

#[async_trait]
impl EnvironmentStore for SnapshotStore {
    async fn list(&self) -> Result<Vec<Environment>, EngineError> {
        Ok(self.read(|s| s.environments.clone()))
    }

    async fn get(&self, env_id: i64) -> Result<Option<Environment>, EngineError> {
        Ok(self.read(|s| s.environments.iter().find(|e| e.id == env_id).cloned()))
    }

    async fn update(&self, env: &Environment) -> Result<(), EngineError> {
        self.mutate(|s| replace_where(&mut s.environments, env, |e| e.id == env.id, "environment"))
            .await
    }
}

#[async_trait]
impl InstanceStore for SnapshotStore {
    async fn list_by_env(&self, env_id: i64) -> Result<Vec<ApplicationInstance>, EngineError> {
        Ok(self.read(|s| {
            s.instances
                .iter()
                .filter(|i| i.env_id == env_id)
                .cloned()
                .collect()
        }))
    }

    async fn env_values(&self, env_id: i64, app_id: i64) -> Result<Option<String>, EngineError> {
        Ok(self.read(|s| {
            s.instance_values
                .iter()
                .find(|v| v.env_id == env_id && v.app_id == app_id)
                .map(|v| v.values.clone())
        }))
    }
}

#[async_trait]
impl VersionStore for SnapshotStore {
    async fn get(&self, version_id: i64) -> Result<Option<ApplicationVersion>, EngineError> {
        Ok(self.read(|s| s.versions.iter().find(|v| v.id == version_id).cloned()))
    }
}

#[async_trait]
impl ApplicationStore for SnapshotStore {
    async fn list(&self) -> Result<Vec<Application>, EngineError> {
        Ok(self.read(|s| s.applications.clone()))
    }

    async fn get(&self, app_id: i64) -> Result<Option<Application>, EngineError> {
        Ok(self.read(|s| s.applications.iter().find(|a| a.id == app_id).cloned()))
    }

    async fn update(&self, app: &Application) -> Result<(), EngineError> {
        self.mutate(|s| replace_where(&mut s.applications, app, |a| a.id == app.id, "application"))
            .await
    }
}

#[async_trait]
impl ServiceStore for SnapshotStore {
    async fn list_by_env(&self, env_id: i64) -> Result<Vec<DevopsService>, EngineError> {
        Ok(self.read(|s| {
            s.services
                .iter()
                .filter(|svc| svc.env_id == env_id)
                .cloned()
                .collect()
        }))
    }

    async fn get(&self, service_id: i64) -> Result<Option<DevopsService>, EngineError> {
        Ok(self.read(|s| s.services.iter().find(|svc| svc.id == service_id).cloned()))
    }

    async fn update(&self, service: &DevopsService) -> Result<(), EngineError> {
        self.mutate(|s| {
            replace_where(&mut s.services, service, |svc| svc.id == service.id, "service")
        })
        .await
    }

    async fn backing_instances(&self, service_id: i64) -> Result<Vec<i64>, EngineError> {
        Ok(self.read(|s| {
            s.service_instances
                .iter()
                .filter(|link| link.service_id == service_id)
                .map(|link| link.instance_id)
                .collect()
        }))
    }
}

#[async_trait]
impl IngressStore for SnapshotStore {
    async fn list_by_env(&self, env_id: i64) -> Result<Vec<DevopsIngress>, EngineError> {
        Ok(self.read(|s| {
            s.ingresses
                .iter()
                .filter(|i| i.env_id == env_id)
                .cloned()
                .collect()
        }))
    }

    async fn list_paths(&self, ingress_id: i64) -> Result<Vec<IngressPath>, EngineError> {
        Ok(self.read(|s| {
            s.ingress_paths
                .iter()
                .filter(|p| p.ingress_id == ingress_id)
                .cloned()
                .collect()
        }))
    }
}

#[async_trait]
impl ResourceDetailStore for SnapshotStore {
    async fn observed(
        &self,
        instance_id: i64,
        kind: &str,
        name: &str,
    ) -> Result<Option<String>, EngineError> {
        Ok(self.read(|s| {
            s.resource_details
                .iter()
                .find(|d| d.instance_id == instance_id && d.kind == kind && d.name == name)
                .map(|d| d.message.clone())
        }))
    }
}

#[async_trait]
impl DevopsProjectStore for SnapshotStore {
    async fn get(&self, project_id: i64) -> Result<Option<DevopsProject>, EngineError> {
        Ok(self.read(|s| {
            s.devops_projects
                .iter()
                .find(|p| p.project_id == project_id)
                .cloned()
        }))
    }

    async fn list_without_env_group(&self) -> Result<Vec<DevopsProject>, EngineError> {
        Ok(self.read(|s| {
            s.devops_projects
                .iter()
                .filter(|p| p.env_group_id.is_none())
                .cloned()
                .collect()
        }))
    }

    async fn update(&self, project: &DevopsProject) -> Result<(), EngineError> {
        self.mutate(|s| {
            replace_where(
                &mut s.devops_projects,
                project,
                |p| p.project_id == project.project_id,
                "devops project",
            )
        })
        .await
    }
}

#[async_trait]
impl BranchStore for SnapshotStore {
    async fn list_by_app(&self, app_id: i64) -> Result<Vec<Branch>, EngineError> {
        Ok(self.read(|s| {
            s.branches
                .iter()
                .filter(|b| b.app_id == app_id)
                .cloned()
                .collect()
        }))
    }

    async fn create(&self, branch: &Branch) -> Result<(), EngineError> {
        self.mutate(|s| {
            s.branches.push(branch.clone());
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl IamDirectory for SnapshotStore {
    async fn project(&self, project_id: i64) -> Result<Option<Project>, EngineError> {
        Ok(self.read(|s| s.projects.iter().find(|p| p.id == project_id).cloned()))
    }

    async fn organization(&self, organization_id: i64) -> Result<Option<Organization>, EngineError> {
        Ok(self.read(|s| {
            s.organizations
                .iter()
                .find(|o| o.id == organization_id)
                .cloned()
        }))
    }

    async fn user_by_login_name(&self, login_name: &str) -> Result<Option<User>, EngineError> {
        Ok(self.read(|s| s.users.iter().find(|u| u.login_name == login_name).cloned()))
    }
}
