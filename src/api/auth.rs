//! Archive sign-in endpoints
//!
//! The hub keeps images on local disk, so there is no archive session of its
//! own to report. `/auth` hands the operator to an external sign-in page
//! when one is configured.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};

use super::HubState;

/// Auth status path polled by the Admin console
pub const AUTH_STATUS_PATH: &str = "/auth-status";

/// Body of `/auth-status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub google_drive_authenticated: bool,
}

pub fn router(state: Arc<HubState>) -> Router {
    Router::new()
        .route(AUTH_STATUS_PATH, get(auth_status))
        .route("/auth", get(sign_in))
        .with_state(state)
}

async fn auth_status() -> Json<AuthStatus> {
    Json(AuthStatus {
        google_drive_authenticated: false,
    })
}

async fn sign_in(State(state): State<Arc<HubState>>) -> Response {
    match &state.auth_url {
        Some(url) => Redirect::temporary(url).into_response(),
        None => (
            StatusCode::NOT_IMPLEMENTED,
            "archive sign-in is not configured on this hub",
        )
            .into_response(),
    }
}
