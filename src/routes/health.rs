//! Health check endpoints
//!
//! Kubernetes-style probes:
//! - /health, /healthz - liveness (is the service running?)
//! - /ready, /readyz   - readiness (can it serve traffic?)
//!
//! Liveness always returns 200. Readiness requires MongoDB unless dev mode
//! is enabled, where the in-memory stores stand in.

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use crate::routes::helpers::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    /// 'online' or 'degraded'
    pub status: &'static str,
    pub version: &'static str,
    pub mode: String,
    pub node_id: String,
    pub database: DatabaseHealth,
    pub chat_clients: usize,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    pub connected: bool,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let args = &state.args;
    let db_connected = state.mongo.is_some();

    let status = if db_connected || args.dev_mode {
        "online"
    } else {
        "degraded"
    };

    let error = if !db_connected && args.dev_mode {
        Some("Dev mode: MongoDB not connected, using in-memory stores".to_string())
    } else {
        None
    };

    HealthResponse {
        healthy: true,
        status,
        version: env!("CARGO_PKG_VERSION"),
        mode: if args.dev_mode {
            "development".to_string()
        } else {
            "production".to_string()
        },
        node_id: args.node_id.to_string(),
        database: DatabaseHealth {
            connected: db_connected,
        },
        chat_clients: state.chat.client_count(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        error,
    }
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    let response = build_health_response(&state);
    json_response(StatusCode::OK, &response)
}

/// Handle readiness probe (/ready, /readyz)
pub fn readiness_check(state: Arc<AppState>) -> Response<BoxBody> {
    let response = build_health_response(&state);

    let is_ready = state.mongo.is_some() || state.args.dev_mode;
    let status = if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    json_response(status, &response)
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<BoxBody> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "kalike",
    };

    json_response(StatusCode::OK, &response)
}
