//! Saga start requests

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::errors::EngineError;
use crate::http::client::HttpClient;

/// Saga run once per 0.9 upgrade to grant users access to the new git projects
pub const UPGRADE_0_9_SAGA: &str = "devops-upgrade-0.9";

/// Starts a named saga with a JSON input
#[async_trait]
pub trait SagaTrigger: Send + Sync {
    async fn start(&self, code: &str, input: &str) -> Result<(), EngineError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartInstance<'a> {
    input: &'a str,
    ref_type: &'a str,
    ref_id: &'a str,
}

/// Posts saga instances to the saga service
pub struct HttpSagaTrigger {
    http: HttpClient,
}

impl HttpSagaTrigger {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SagaTrigger for HttpSagaTrigger {
    async fn start(&self, code: &str, input: &str) -> Result<(), EngineError> {
        let path = format!("/v1/sagas/instances/{}", code);
        let body = StartInstance {
            input,
            ref_type: "",
            ref_id: "",
        };
        let _: serde_json::Value = self.http.post(&path, None, &body).await?;
        info!("Saga {} started", code);
        Ok(())
    }
}

/// Used when no saga service is configured; only logs the request
#[derive(Debug, Default)]
pub struct LoggingSagaTrigger;

#[async_trait]
impl SagaTrigger for LoggingSagaTrigger {
    async fn start(&self, code: &str, input: &str) -> Result<(), EngineError> {
        info!("No saga service configured, skipping saga {} with input {}", code, input);
        Ok(())
    }
}
