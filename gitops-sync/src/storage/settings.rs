//! Settings file management

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::git::transport::{TemplateVersions, MASTER};
use crate::logs::LogLevel;

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines instead of plain text
    #[serde(default)]
    pub log_json: bool,

    /// Base URL chart repository paths are appended to
    #[serde(default = "default_helm_base_url")]
    pub helm_base_url: String,

    /// Public gateway URL; webhooks point at `<gateway>/devops/webhook`
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Saga service base URL; sagas are only logged when unset
    #[serde(default)]
    pub saga_url: Option<String>,

    #[serde(default)]
    pub gitlab: GitlabSettings,

    #[serde(default)]
    pub templates: TemplateSettings,

    #[serde(default)]
    pub server: ServerSettings,

    /// Serve the trigger API
    #[serde(default = "default_true")]
    pub enable_http_server: bool,

    /// Record snapshot; defaults to `<base>/data/state.json`
    #[serde(default)]
    pub state_file: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_helm_base_url() -> String {
    "http://localhost:8080/".to_string()
}

fn default_gateway_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            helm_base_url: default_helm_base_url(),
            gateway_url: default_gateway_url(),
            saga_url: None,
            gitlab: GitlabSettings::default(),
            templates: TemplateSettings::default(),
            server: ServerSettings::default(),
            enable_http_server: true,
            state_file: None,
        }
    }
}

impl Settings {
    /// Read settings from `file`, falling back to defaults when it is missing
    pub async fn load(file: &File) -> Result<Self, EngineError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        file.read_json()
            .await
            .map_err(|e| EngineError::ConfigError(format!("{}: {}", file.path().display(), e)))
    }
}

/// Git service API and SSH endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitlabSettings {
    #[serde(default = "default_gitlab_api_url")]
    pub api_url: String,

    /// SSH prefix environment repositories are cloned from, e.g. `git@gitlab.example.com`
    #[serde(default = "default_gitlab_ssh_base")]
    pub ssh_base: String,

    #[serde(default, skip_serializing)]
    pub private_token: String,
}

fn default_gitlab_api_url() -> String {
    "http://localhost/api/v4".to_string()
}

fn default_gitlab_ssh_base() -> String {
    "git@localhost".to_string()
}

impl Default for GitlabSettings {
    fn default() -> Self {
        Self {
            api_url: default_gitlab_api_url(),
            ssh_base: default_gitlab_ssh_base(),
            private_token: String::new(),
        }
    }
}

/// Branch cloned for each project template type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSettings {
    #[serde(default = "default_template_branch")]
    pub micro_service: String,

    #[serde(default = "default_template_branch")]
    pub micro_service_front: String,

    #[serde(default = "default_template_branch")]
    pub java_lib: String,
}

fn default_template_branch() -> String {
    MASTER.to_string()
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            micro_service: default_template_branch(),
            micro_service_front: default_template_branch(),
            java_lib: default_template_branch(),
        }
    }
}

impl From<&TemplateSettings> for TemplateVersions {
    fn from(settings: &TemplateSettings) -> Self {
        TemplateVersions {
            micro_service: settings.micro_service.clone(),
            micro_service_front: settings.micro_service_front.clone(),
            java_lib: settings.java_lib.clone(),
        }
    }
}

/// Trigger API listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8060
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}
