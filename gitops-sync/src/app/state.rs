//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::authn::keygen::SshKeygenCommand;
use crate::checklog::store::{CheckLogStore, FileCheckLogStore};
use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::git::transport::GitTransport;
use crate::http::client::HttpClient;
use crate::http::gitlab::GitlabClient;
use crate::http::saga::{HttpSagaTrigger, LoggingSagaTrigger, SagaTrigger};
use crate::manifest::values::YamlValuesMerger;
use crate::reconcile::builders::{BuilderDeps, ManifestBuilder};
use crate::reconcile::ingress::DefaultIngressBuilder;
use crate::reconcile::locator::GitopsRepositoryLocator;
use crate::reconcile::Materializer;
use crate::storage::snapshot::SnapshotStore;
use crate::upgrade::UpgradeContext;

/// Main application state
pub struct AppState {
    /// Record store every collaborator trait is served from
    pub store: Arc<SnapshotStore>,

    /// Where finished upgrade runs are persisted
    pub check_logs: Arc<dyn CheckLogStore>,

    /// Collaborators the upgrade routines run against
    pub upgrade: Arc<UpgradeContext>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, EngineError> {
        info!("Initializing application state...");

        let layout = &options.storage.layout;
        layout.setup().await?;

        let state_file = match &options.storage.state_file {
            Some(path) => File::new(path.clone()),
            None => layout.state_file(),
        };
        let store = Arc::new(SnapshotStore::load(state_file).await?);
        let check_logs: Arc<dyn CheckLogStore> =
            Arc::new(FileCheckLogStore::new(layout.check_log_file()));

        let gitlab_http = HttpClient::new(&options.gitlab.api_url)?
            .with_private_token(options.gitlab.private_token.clone());
        let saga: Arc<dyn SagaTrigger> = match &options.saga_url {
            Some(url) => Arc::new(HttpSagaTrigger::new(HttpClient::new(url)?)),
            None => Arc::new(LoggingSagaTrigger),
        };

        let transport = GitTransport::new(layout.workspace_dir().path())
            .with_templates(options.templates.clone());
        let materializer = Arc::new(build_materializer(
            store.clone(),
            &options.helm_base_url,
            &options.gitlab.ssh_base,
            transport,
        ));

        let upgrade = Arc::new(UpgradeContext {
            environments: store.clone(),
            applications: store.clone(),
            branches: store.clone(),
            devops_projects: store.clone(),
            iam: store.clone(),
            gitlab: Arc::new(GitlabClient::new(gitlab_http)),
            saga,
            keygen: Arc::new(SshKeygenCommand::default()),
            materializer,
            gateway_url: options.gateway_url.clone(),
        });

        Ok(Self {
            store,
            check_logs,
            upgrade,
        })
    }
}

/// Wire a materializer whose every store is `store`
pub fn build_materializer(
    store: Arc<SnapshotStore>,
    helm_base_url: &str,
    ssh_base: &str,
    transport: GitTransport,
) -> Materializer {
    let deps = BuilderDeps {
        instances: store.clone(),
        versions: store.clone(),
        applications: store.clone(),
        services: store.clone(),
        ingresses: store.clone(),
        resource_details: store.clone(),
        values: Arc::new(YamlValuesMerger),
        ingress_builder: Arc::new(DefaultIngressBuilder::new(store.clone())),
    };
    Materializer::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        ManifestBuilder::new(deps, helm_base_url),
        Arc::new(GitopsRepositoryLocator::new(store, ssh_base)),
        transport,
    )
}
