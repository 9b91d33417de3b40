//! HTTP request handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::server::state::ServerState;
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "gitops-sync".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Answer to an accepted upgrade request
#[derive(Debug, Serialize)]
pub struct UpgradeAccepted {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_id: Option<i64>,
}

/// Queue an upgrade over every environment
pub async fn upgrade_handler(
    State(state): State<Arc<ServerState>>,
    Path(version): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    state.scheduler.check_log(&version).map_err(|e| {
        error!("Unable to queue upgrade {}: {}", version, e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok((
        StatusCode::ACCEPTED,
        Json(UpgradeAccepted {
            version,
            env_id: None,
        }),
    ))
}

/// Queue an upgrade limited to one environment
pub async fn upgrade_env_handler(
    State(state): State<Arc<ServerState>>,
    Path((version, env_id)): Path<(String, i64)>,
) -> Result<impl IntoResponse, StatusCode> {
    state
        .scheduler
        .check_log_by_env(&version, env_id)
        .map_err(|e| {
            error!("Unable to queue upgrade {} for env {}: {}", version, env_id, e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;
    Ok((
        StatusCode::ACCEPTED,
        Json(UpgradeAccepted {
            version,
            env_id: Some(env_id),
        }),
    ))
}
