//! Environment repository resolution

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::errors::EngineError;
use crate::git::transport::GitTransport;
use crate::git::tree::WorkingTree;
use crate::storage::models::Environment;
use crate::storage::repos::{required, IamDirectory};

/// Produces an up-to-date working tree for an environment
#[async_trait]
pub trait EnvRepositoryLocator: Send + Sync {
    async fn locate(&self, env: &Environment, transport: &GitTransport) -> Result<WorkingTree, EngineError>;
}

/// Clones `<ssh base>:<org>-<project>-gitops/<env>.git` into
/// `gitops/<org>/<project>/<env>`, or pulls when the checkout already exists.
pub struct GitopsRepositoryLocator {
    iam: Arc<dyn IamDirectory>,
    ssh_base: String,
}

impl GitopsRepositoryLocator {
    pub fn new(iam: Arc<dyn IamDirectory>, ssh_base: impl Into<String>) -> Self {
        Self {
            iam,
            ssh_base: ssh_base.into(),
        }
    }
}

pub fn env_checkout_name(org_code: &str, project_code: &str, env_code: &str) -> String {
    format!("gitops/{}/{}/{}", org_code, project_code, env_code)
}

pub fn env_repository_url(ssh_base: &str, org_code: &str, project_code: &str, env_code: &str) -> String {
    format!(
        "{}:{}-{}-gitops/{}.git",
        ssh_base.trim_end_matches([':', '/']),
        org_code,
        project_code,
        env_code
    )
}

#[async_trait]
impl EnvRepositoryLocator for GitopsRepositoryLocator {
    async fn locate(&self, env: &Environment, transport: &GitTransport) -> Result<WorkingTree, EngineError> {
        let project = required(self.iam.project(env.project_id).await?, "project", env.project_id)?;
        let org = required(
            self.iam.organization(project.organization_id).await?,
            "organization",
            project.organization_id,
        )?;

        let local = transport.working_directory(&env_checkout_name(&org.code, &project.code, &env.code));
        if tokio::fs::metadata(local.join(".git")).await.is_ok() {
            debug!("Updating existing checkout {}", local.display());
            transport.pull_by_ssh(&local).await;
            return WorkingTree::open(local).await;
        }

        if tokio::fs::metadata(&local).await.is_ok() {
            tokio::fs::remove_dir_all(&local).await?;
        }
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = env_repository_url(&self.ssh_base, &org.code, &project.code, &env.code);
        info!("Cloning environment {} repository", env.code);
        transport.clone_by_ssh(&local, &url).await
    }
}
