//! HTTP request handlers

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::Value;

use crate::hardware::gpio::GpioMode;
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
        service: "trail-agent".to_string(),
        version: version.version,
    })
}

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
    })
}

/// Control states response
#[derive(Debug, Serialize)]
pub struct ControlsResponse {
    pub device_id: String,
    pub mode: GpioMode,
    pub controls: BTreeMap<String, Value>,
}

/// Cached control states
pub async fn controls_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(ControlsResponse {
        device_id: state.device_id.clone(),
        mode: state.executor.mode(),
        controls: state.executor.states().await,
    })
}
