//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::git::transport::TemplateVersions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage configuration
    pub storage: StorageOptions,

    /// Base URL chart repository paths are appended to
    pub helm_base_url: String,

    /// Public gateway URL webhooks are registered under
    pub gateway_url: String,

    /// Saga service base URL
    pub saga_url: Option<String>,

    /// Git service options
    pub gitlab: GitlabOptions,

    /// Branch cloned per project template type
    pub templates: TemplateVersions,

    /// Enable the trigger API
    pub enable_http_server: bool,

    /// Server configuration
    pub server: ServerOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), StorageLayout::default())
    }
}

impl AppOptions {
    /// Build options from a settings file rooted at `layout`
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageOptions {
                state_file: settings.state_file.as_ref().map(PathBuf::from),
                layout,
            },
            helm_base_url: settings.helm_base_url.clone(),
            gateway_url: settings.gateway_url.clone(),
            saga_url: settings.saga_url.clone(),
            gitlab: GitlabOptions {
                api_url: settings.gitlab.api_url.clone(),
                ssh_base: settings.gitlab.ssh_base.clone(),
                private_token: SecretString::from(settings.gitlab.private_token.clone()),
            },
            templates: TemplateVersions::from(&settings.templates),
            enable_http_server: settings.enable_http_server,
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown, an in-flight upgrade included
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(300),
        }
    }
}

/// Storage configuration options
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Record snapshot location overriding the layout default
    pub state_file: Option<PathBuf>,
}

/// Git service API access
#[derive(Debug, Clone)]
pub struct GitlabOptions {
    pub api_url: String,

    /// SSH prefix environment repositories are cloned from
    pub ssh_base: String,

    pub private_token: SecretString,
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8060,
        }
    }
}
