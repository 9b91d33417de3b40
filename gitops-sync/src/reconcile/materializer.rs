//! Environment repository materializer
//!
//! Walks the live instances, services and ingresses of an environment and
//! commits one manifest per resource whose file is not yet in the working
//! tree. Existing files are never rewritten, so a rerun over an unchanged
//! store adds no commits. Each resource, and each resource kind, succeeds or
//! fails on its own; only a failure to resolve the working tree or to publish
//! it abandons the environment.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::checklog::CheckLogRecorder;
use crate::errors::EngineError;
use crate::git::transport::GitTransport;
use crate::git::tree::WorkingTree;
use crate::manifest::serializer::to_manifest_yaml;
use crate::reconcile::builders::ManifestBuilder;
use crate::reconcile::locator::EnvRepositoryLocator;
use crate::reconcile::publish::tag_and_push;
use crate::storage::models::Environment;
use crate::storage::repos::{EnvironmentStore, IngressStore, InstanceStore, ServiceStore};

const SERIALIZABLE_SUFFIX: &str = " serializable to yaml";

/// What one environment pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvironmentReport {
    pub env_id: i64,
    pub env_code: String,

    /// Manifest files committed in this pass
    pub written: Vec<String>,

    /// Manifest files left alone because they already existed
    pub skipped: Vec<String>,

    /// Manifest files whose resource failed to build or commit
    pub failed: Vec<String>,

    pub tag_created: bool,
    pub pushed: bool,
}

pub struct Materializer {
    environments: Arc<dyn EnvironmentStore>,
    instances: Arc<dyn InstanceStore>,
    services: Arc<dyn ServiceStore>,
    ingresses: Arc<dyn IngressStore>,
    builder: ManifestBuilder,
    locator: Arc<dyn EnvRepositoryLocator>,
    transport: GitTransport,
}

impl Materializer {
    /// `transport` carries the workspace root and commit identity; each
    /// environment gets a copy bound to its own SSH key.
    pub fn new(
        environments: Arc<dyn EnvironmentStore>,
        instances: Arc<dyn InstanceStore>,
        services: Arc<dyn ServiceStore>,
        ingresses: Arc<dyn IngressStore>,
        builder: ManifestBuilder,
        locator: Arc<dyn EnvRepositoryLocator>,
        transport: GitTransport,
    ) -> Self {
        Self {
            environments,
            instances,
            services,
            ingresses,
            builder,
            locator,
            transport,
        }
    }

    /// Materialize one environment, or every environment that has a git project
    pub async fn run(&self, env_id: Option<i64>, recorder: &CheckLogRecorder) -> Vec<EnvironmentReport> {
        let environments = match self.select(env_id).await {
            Ok(envs) => envs,
            Err(e) => {
                error!("Unable to list environments: {}", e);
                recorder.failed(scope_label(env_id), &e);
                return Vec::new();
            }
        };

        let environments: Vec<Environment> = environments
            .into_iter()
            .filter(|env| env.gitlab_env_project_id.is_some())
            .collect();
        info!("Begin to sync objects for {} environment(s)", environments.len());

        let mut reports = Vec::with_capacity(environments.len());
        for env in &environments {
            match self.materialize(env, recorder).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!("{}:{} sync aborted: {}", env.code, env.id, e);
                    recorder.failed(format!("env: {} sync objects", env.code), &e);
                }
            }
        }
        reports
    }

    async fn select(&self, env_id: Option<i64>) -> Result<Vec<Environment>, EngineError> {
        match env_id {
            Some(id) => match self.environments.get(id).await? {
                Some(env) => Ok(vec![env]),
                None => Err(EngineError::LookupError(format!("environment {} not found", id))),
            },
            None => self.environments.list().await,
        }
    }

    /// Materialize a single environment
    pub async fn materialize(
        &self,
        env: &Environment,
        recorder: &CheckLogRecorder,
    ) -> Result<EnvironmentReport, EngineError> {
        info!("{}:{} begin to upgrade", env.code, env.id);
        let transport = match &env.env_id_rsa {
            Some(key) => self.transport.clone().with_ssh_key(key.clone()),
            None => self.transport.clone(),
        };
        let tree = self.locator.locate(env, &transport).await?;

        let mut report = EnvironmentReport {
            env_id: env.id,
            env_code: env.code.clone(),
            ..Default::default()
        };

        self.sync_instances(env, &transport, &tree, recorder, &mut report).await;
        self.sync_services(env, &transport, &tree, recorder, &mut report).await;
        self.sync_ingresses(env, &transport, &tree, recorder, &mut report).await;

        report.tag_created = tag_and_push(&transport, &tree).await?;
        report.pushed = true;
        info!(
            "{}:{} finish to upgrade ({} written, {} skipped, {} failed)",
            env.code,
            env.id,
            report.written.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn sync_instances(
        &self,
        env: &Environment,
        transport: &GitTransport,
        tree: &WorkingTree,
        recorder: &CheckLogRecorder,
        report: &mut EnvironmentReport,
    ) {
        let Some(instances) = listed(env, "instances", self.instances.list_by_env(env.id).await, recorder) else {
            return;
        };
        for instance in instances {
            if instance.status.is_deleted() {
                continue;
            }
            let content = format!("instance: {}{}", instance.code, SERIALIZABLE_SUFFIX);
            let file = instance.manifest_file();
            if tree.file_exists(&file).await {
                debug!("{} exists, skipping instance {}", file, instance.code);
                report.skipped.push(file);
                continue;
            }
            let result = async {
                let release = self.builder.release(&instance).await?;
                commit_manifest(transport, tree, &file, &release).await
            }
            .await;
            record(env, "instance", &instance.code, content, file, result, recorder, report);
        }
    }

    async fn sync_services(
        &self,
        env: &Environment,
        transport: &GitTransport,
        tree: &WorkingTree,
        recorder: &CheckLogRecorder,
        report: &mut EnvironmentReport,
    ) {
        let Some(services) = listed(env, "services", self.services.list_by_env(env.id).await, recorder) else {
            return;
        };
        for service in services {
            if service.status.is_deleted() {
                continue;
            }
            let content = format!("service: {}{}", service.name, SERIALIZABLE_SUFFIX);
            let file = service.manifest_file();
            if tree.file_exists(&file).await {
                debug!("{} exists, skipping service {}", file, service.name);
                report.skipped.push(file);
                continue;
            }
            let result = async {
                let doc = self.builder.service(&service).await?;
                commit_manifest(transport, tree, &file, &doc).await
            }
            .await;
            record(env, "service", &service.name, content, file, result, recorder, report);
        }
    }

    async fn sync_ingresses(
        &self,
        env: &Environment,
        transport: &GitTransport,
        tree: &WorkingTree,
        recorder: &CheckLogRecorder,
        report: &mut EnvironmentReport,
    ) {
        let Some(ingresses) = listed(env, "ingresses", self.ingresses.list_by_env(env.id).await, recorder) else {
            return;
        };
        for ingress in ingresses {
            if ingress.status.is_deleted() {
                continue;
            }
            let content = format!("ingress: {}{}", ingress.name, SERIALIZABLE_SUFFIX);
            let file = ingress.manifest_file();
            if tree.file_exists(&file).await {
                debug!("{} exists, skipping ingress {}", file, ingress.name);
                report.skipped.push(file);
                continue;
            }
            let result = async {
                let doc = self.builder.ingress(&ingress).await?;
                commit_manifest(transport, tree, &file, &doc).await
            }
            .await;
            record(env, "ingress", &ingress.name, content, file, result, recorder, report);
        }
    }
}

/// Unwrap a resource listing, recording a failed `<kind>: <env> list` entry
fn listed<T>(
    env: &Environment,
    kind: &str,
    result: Result<Vec<T>, EngineError>,
    recorder: &CheckLogRecorder,
) -> Option<Vec<T>> {
    match result {
        Ok(items) => Some(items),
        Err(e) => {
            warn!("{}:{} unable to list {}: {}", env.code, env.id, kind, e);
            recorder.failed(format!("{}: {} list", kind, env.code), &e);
            None
        }
    }
}

async fn commit_manifest<T: Serialize>(
    transport: &GitTransport,
    tree: &WorkingTree,
    file: &str,
    resource: &T,
) -> Result<(), EngineError> {
    let yaml = to_manifest_yaml(resource)?;
    transport.create_file_in_repo(tree, file, &yaml, None).await
}

#[allow(clippy::too_many_arguments)]
fn record(
    env: &Environment,
    kind: &str,
    name: &str,
    content: String,
    file: String,
    result: Result<(), EngineError>,
    recorder: &CheckLogRecorder,
    report: &mut EnvironmentReport,
) {
    match result {
        Ok(()) => {
            recorder.success(content);
            report.written.push(file);
        }
        Err(e) => {
            warn!("{}:{} {}/{} sync failed: {}", env.code, env.id, kind, name, e);
            recorder.failed(content, &e);
            report.failed.push(file);
        }
    }
}

fn scope_label(env_id: Option<i64>) -> String {
    match env_id {
        Some(id) => format!("env: {} sync objects", id),
        None => "env: all sync objects".to_string(),
    }
}
