//! Error types for the sync engine

use thiserror::Error;

/// Main error type for the sync engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Clone, pull or push failed at the network or authentication layer
    #[error("Transport error: {0}")]
    TransportError(String),

    /// A manifest could not be built or serialized
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("File system error: {0}")]
    FileSystemError(#[from] std::io::Error),

    /// A referenced entity (version, application, environment...) is missing
    #[error("Lookup error: {0}")]
    LookupError(String),

    /// Non-success answer from group/project provisioning
    #[error("Remote provisioning error: {0}")]
    RemoteProvisioningError(String),

    #[error("Git error: {0}")]
    GitError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::SerializationError(err.to_string())
    }
}

impl From<git2::Error> for EngineError {
    fn from(err: git2::Error) -> Self {
        match err.class() {
            git2::ErrorClass::Net
            | git2::ErrorClass::Ssh
            | git2::ErrorClass::Http
            | git2::ErrorClass::Ssl
            | git2::ErrorClass::Callback => EngineError::TransportError(err.message().to_string()),
            _ => match err.code() {
                git2::ErrorCode::Auth | git2::ErrorCode::Certificate => {
                    EngineError::TransportError(err.message().to_string())
                }
                _ => EngineError::GitError(err.message().to_string()),
            },
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::Internal(format!("blocking task failed: {}", err))
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}
