//! Health check endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use super::HubState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Detailed readiness response
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub storage: CheckResult,
    /// Stations that have joined
    pub stations: Vec<String>,
}

/// Result of a single health check
#[derive(Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckResult {
    const fn ok() -> Self {
        Self {
            status: "ok",
            message: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            status: "fail",
            message: Some(message.into()),
        }
    }
}

pub fn router(state: Arc<HubState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .with_state(state)
}

/// Liveness probe
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness probe: image storage writable, plus who is connected
async fn ready(State(state): State<Arc<HubState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let storage = check_storage(&state).await;
    let stations = state
        .registry
        .lock()
        .await
        .roster()
        .into_iter()
        .map(|e| e.name)
        .collect();

    let ok = storage.status == "ok";
    (
        if ok {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        },
        Json(ReadinessResponse {
            status: if ok { "ok" } else { "degraded" },
            checks: ReadinessChecks { storage, stations },
        }),
    )
}

async fn check_storage(state: &HubState) -> CheckResult {
    match tokio::fs::create_dir_all(state.storage.dir()).await {
        Ok(()) => CheckResult::ok(),
        Err(e) => CheckResult::fail(format!("{}: {e}", state.storage.dir().display())),
    }
}
