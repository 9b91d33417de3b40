//! Version-specific upgrade routines
//!
//! Every routine records one check log entry per entity it touches and keeps
//! going when an entity fails.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use crate::authn::keygen::SshKeyGenerator;
use crate::checklog::CheckLogRecorder;
use crate::errors::EngineError;
use crate::http::gitlab::{
    GitlabProjectPayload, GitlabService, GroupCreation, NewGroup, ProjectHook, ADMIN_USER_ID,
};
use crate::http::saga::{SagaTrigger, UPGRADE_0_9_SAGA};
use crate::reconcile::Materializer;
use crate::storage::models::{Application, Branch, DevopsProject, Environment};
use crate::storage::repos::{
    required, ApplicationStore, BranchStore, DevopsProjectStore, EnvironmentStore, IamDirectory,
};
use crate::utils::join_url;

const ENV_PROJECT_TYPE: &str = "ENV";
const GITOPS_SUFFIX: &str = "gitops";
const WEBHOOK_PATH: &str = "devops/webhook";
const APP_CONCURRENCY: usize = 8;

/// Known upgrade targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeVersion {
    /// Webhooks and branch records for applications
    V0_8,
    /// GitOps groups, environment projects and manifests
    V0_9,
    /// Webhook URL refresh
    V1_0,
    Unknown(String),
}

impl UpgradeVersion {
    pub fn parse(version: &str) -> Self {
        match version {
            "0.8" => UpgradeVersion::V0_8,
            "0.9" => UpgradeVersion::V0_9,
            "1.0" => UpgradeVersion::V1_0,
            other => UpgradeVersion::Unknown(other.to_string()),
        }
    }
}

/// Everything a routine may touch
pub struct UpgradeContext {
    pub environments: Arc<dyn EnvironmentStore>,
    pub applications: Arc<dyn ApplicationStore>,
    pub branches: Arc<dyn BranchStore>,
    pub devops_projects: Arc<dyn DevopsProjectStore>,
    pub iam: Arc<dyn IamDirectory>,
    pub gitlab: Arc<dyn GitlabService>,
    pub saga: Arc<dyn SagaTrigger>,
    pub keygen: Arc<dyn SshKeyGenerator>,
    pub materializer: Arc<Materializer>,

    /// Public gateway URL webhooks are registered under
    pub gateway_url: String,
}

impl UpgradeContext {
    fn webhook_url(&self) -> String {
        join_url(&self.gateway_url, WEBHOOK_PATH)
    }
}

/// Run the routine for `version`, optionally limited to one environment
pub async fn run_version(
    ctx: &UpgradeContext,
    version: &str,
    env_id: Option<i64>,
    recorder: &CheckLogRecorder,
) {
    match UpgradeVersion::parse(version) {
        UpgradeVersion::V0_8 => {
            info!("Start to execute upgrade task 0.8");
            upgrade_0_8(ctx, recorder).await;
        }
        UpgradeVersion::V0_9 => {
            info!("Start to execute upgrade task 0.9");
            upgrade_0_9(ctx, env_id, recorder).await;
        }
        UpgradeVersion::V1_0 => {
            info!("Start to execute upgrade task 1.0");
            upgrade_1_0(ctx, recorder).await;
        }
        UpgradeVersion::Unknown(other) => {
            info!("version not matched: {}", other);
        }
    }
}

// ==================================== 0.8 ======================================= //

async fn upgrade_0_8(ctx: &UpgradeContext, recorder: &CheckLogRecorder) {
    let apps = match ctx.applications.list().await {
        Ok(apps) => apps,
        Err(e) => {
            warn!("Unable to list applications: {}", e);
            recorder.failed("app: all create gitlab webhook", &e);
            return;
        }
    };

    stream::iter(
        apps.into_iter()
            .filter(|app| app.gitlab_project_id.is_some() && app.hook_id.is_none()),
    )
    .for_each_concurrent(APP_CONCURRENCY, |app| async move {
        let content = format!("app: {} create gitlab webhook", app.name);
        match sync_webhook(ctx, app.clone()).await {
            Ok(()) => recorder.success(content),
            Err(e) => recorder.failed(content, &e),
        }

        let content = format!("app: {} sync branches", app.name);
        match sync_branches(ctx, &app).await {
            Ok(created) => {
                info!("{} branch record(s) added for {}", created, app.name);
                recorder.success(content);
            }
            Err(e) => recorder.failed(content, &e),
        }
    })
    .await;
}

async fn sync_webhook(ctx: &UpgradeContext, mut app: Application) -> Result<(), EngineError> {
    let project_id = required(app.gitlab_project_id, "git project of application", app.id)?;
    let hook = ProjectHook::all_events(ctx.webhook_url(), app.token.clone());
    let created = ctx
        .gitlab
        .create_webhook(project_id, ADMIN_USER_ID, &hook)
        .await?;
    let hook_id = created.id.ok_or_else(|| {
        EngineError::RemoteProvisioningError(format!("webhook of project {} has no id", project_id))
    })?;
    app.hook_id = Some(hook_id);
    ctx.applications.update(&app).await
}

/// Add branch records for remote branches not yet known locally
async fn sync_branches(ctx: &UpgradeContext, app: &Application) -> Result<usize, EngineError> {
    let project_id = required(app.gitlab_project_id, "git project of application", app.id)?;
    let remote = ctx.gitlab.list_branches(project_id, ADMIN_USER_ID).await?;
    let known: Vec<String> = ctx
        .branches
        .list_by_app(app.id)
        .await?
        .into_iter()
        .map(|b| b.branch_name)
        .collect();

    let mut created = 0;
    for branch in remote.into_iter().filter(|b| !known.contains(&b.name)) {
        let last_commit_user = match &branch.commit.author_name {
            Some(login) => ctx.iam.user_by_login_name(login).await?.map(|u| u.id),
            None => None,
        };
        let committed = branch.commit.committed_date.map(|d| d.with_timezone(&Utc));
        let record = Branch {
            app_id: app.id,
            branch_name: branch.name,
            last_commit: branch.commit.id.clone(),
            last_commit_date: committed,
            last_commit_msg: branch.commit.message,
            last_commit_user,
            checkout_commit: branch.commit.id,
            checkout_date: committed,
        };
        ctx.branches.create(&record).await?;
        created += 1;
    }
    Ok(created)
}

// ==================================== 0.9 ======================================= //

async fn upgrade_0_9(ctx: &UpgradeContext, env_id: Option<i64>, recorder: &CheckLogRecorder) {
    sync_env_groups(ctx, recorder).await;
    start_user_access_saga(ctx, recorder).await;
    sync_env_projects(ctx, recorder).await;
    ctx.materializer.run(env_id, recorder).await;
}

async fn sync_env_groups(ctx: &UpgradeContext, recorder: &CheckLogRecorder) {
    let projects = match ctx.devops_projects.list_without_env_group().await {
        Ok(projects) => projects,
        Err(e) => {
            warn!("Unable to list projects without a gitops group: {}", e);
            recorder.failed("project: all create gitops group", &e);
            return;
        }
    };
    info!("{} projects need to upgrade", projects.len());

    for project in projects {
        let mut content = format!("project: {} create gitops group", project.project_id);
        let result = create_env_group(ctx, project, &mut content).await;
        match result {
            Ok(()) => recorder.success(content),
            Err(e) => {
                warn!("Create project gitops group error: {}", e);
                recorder.failed(content, &e);
            }
        }
    }
}

async fn create_env_group(
    ctx: &UpgradeContext,
    mut devops_project: DevopsProject,
    content: &mut String,
) -> Result<(), EngineError> {
    let project = required(
        ctx.iam.project(devops_project.project_id).await?,
        "project",
        devops_project.project_id,
    )?;
    *content = format!("project: {} create gitops group", project.name);
    let org = required(
        ctx.iam.organization(project.organization_id).await?,
        "organization",
        project.organization_id,
    )?;

    let group = NewGroup {
        name: format!("{}-{}-{}", org.name, project.name, GITOPS_SUFFIX),
        path: format!("{}-{}-{}", org.code, project.code, GITOPS_SUFFIX),
    };
    match ctx.gitlab.create_group(&group, ADMIN_USER_ID).await? {
        GroupCreation::Created(created) => {
            devops_project.env_group_id = Some(created.id);
            ctx.devops_projects.update(&devops_project).await
        }
        GroupCreation::Rejected { headers, body, .. } => Err(EngineError::RemoteProvisioningError(
            format!("create group response error! Header:{}    Body: {}", headers, body),
        )),
    }
}

async fn start_user_access_saga(ctx: &UpgradeContext, recorder: &CheckLogRecorder) {
    info!("Saga {} start", UPGRADE_0_9_SAGA);
    match ctx.saga.start(UPGRADE_0_9_SAGA, "{}").await {
        Ok(()) => info!("Saga {} start success", UPGRADE_0_9_SAGA),
        Err(e) => {
            warn!("Saga {} failed to start: {}", UPGRADE_0_9_SAGA, e);
            recorder.failed(format!("saga: {}", UPGRADE_0_9_SAGA), &e);
        }
    }
}

async fn sync_env_projects(ctx: &UpgradeContext, recorder: &CheckLogRecorder) {
    info!("Start to sync env project");
    let environments = match ctx.environments.list().await {
        Ok(envs) => envs,
        Err(e) => {
            warn!("Unable to list environments: {}", e);
            recorder.failed("env: all create gitops project", &e);
            return;
        }
    };

    for env in environments
        .into_iter()
        .filter(|env| env.gitlab_env_project_id.is_none())
    {
        let content = format!("env: {} create gitops project", env.name);
        match create_env_project(ctx, env).await {
            Ok(()) => recorder.success(content),
            Err(e) => {
                warn!("Create env git project error: {}", e);
                recorder.failed(content, &e);
            }
        }
    }
}

async fn create_env_project(ctx: &UpgradeContext, mut env: Environment) -> Result<(), EngineError> {
    let project = required(ctx.iam.project(env.project_id).await?, "project", env.project_id)?;
    let org = required(
        ctx.iam.organization(project.organization_id).await?,
        "organization",
        project.organization_id,
    )?;

    if !env.has_keypair() {
        let seed = format!("{}/{}/{}", org.code, project.code, env.code);
        let pair = ctx.keygen.generate(&seed).await?;
        env.env_id_rsa = Some(pair.private_key.expose_secret().to_string());
        env.env_id_rsa_pub = Some(pair.public_key);
        ctx.environments.update(&env).await?;
    }

    let devops_project = required(ctx.devops_projects.get(project.id).await?, "devops project", project.id)?;
    let group_id = required(devops_project.env_group_id, "gitops group of project", project.id)?;
    let payload = GitlabProjectPayload {
        group_id,
        user_id: ADMIN_USER_ID,
        path: env.code.clone(),
        organization_id: None,
        project_type: ENV_PROJECT_TYPE.to_string(),
    };
    let created = ctx.gitlab.create_project(&payload).await?;
    env.gitlab_env_project_id = Some(created.id);
    ctx.environments.update(&env).await
}

// ==================================== 1.0 ======================================= //

async fn upgrade_1_0(ctx: &UpgradeContext, recorder: &CheckLogRecorder) {
    let apps = match ctx.applications.list().await {
        Ok(apps) => apps,
        Err(e) => {
            warn!("Unable to list applications: {}", e);
            recorder.failed("app: all update gitlab webhook", &e);
            return;
        }
    };

    stream::iter(apps.into_iter().filter(|app| app.hook_id.is_some()))
        .for_each_concurrent(APP_CONCURRENCY, |app| async move {
            let content = format!("app: {} update gitlab webhook", app.name);
            match refresh_webhook(ctx, &app).await {
                Ok(()) => recorder.success(content),
                Err(e) => recorder.failed(content, &e),
            }
        })
        .await;
}

async fn refresh_webhook(ctx: &UpgradeContext, app: &Application) -> Result<(), EngineError> {
    let project_id = required(app.gitlab_project_id, "git project of application", app.id)?;
    let hook_id = required(app.hook_id, "webhook of application", app.id)?;
    let hook = ProjectHook::all_events(ctx.webhook_url(), app.token.clone());
    ctx.gitlab
        .update_webhook(project_id, hook_id, ADMIN_USER_ID, &hook)
        .await?;
    Ok(())
}
