//! `POST /upload-image`: multipart shot upload from the Capture Device

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
};

use super::HubState;
use crate::storage::{UPLOAD_PATH, UploadResponse};

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Build the upload route
pub fn router(state: Arc<HubState>) -> Router {
    Router::new()
        .route(UPLOAD_PATH, post(upload_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

struct ImagePart {
    filename: Option<String>,
    bytes: Vec<u8>,
}

async fn upload_image(
    State(state): State<Arc<HubState>>,
    mut multipart: Multipart,
) -> (StatusCode, Json<UploadResponse>) {
    let bad_request = |reason: String| {
        tracing::warn!(%reason, "upload rejected");
        (StatusCode::BAD_REQUEST, Json(UploadResponse::failed(reason)))
    };

    let mut image: Option<ImagePart> = None;
    let mut session: Option<String> = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(format!("malformed multipart body: {e}")),
        };
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let filename = field.file_name().map(str::to_string);
                match field.bytes().await {
                    Ok(bytes) => {
                        image = Some(ImagePart {
                            filename,
                            bytes: bytes.to_vec(),
                        });
                    }
                    Err(e) => return bad_request(format!("unreadable image part: {e}")),
                }
            }
            Some("sessionId") => match field.text().await {
                Ok(text) => session = Some(text.trim().to_string()),
                Err(e) => return bad_request(format!("unreadable sessionId: {e}")),
            },
            other => tracing::debug!(field = ?other, "ignoring upload field"),
        }
    }

    let Some(image) = image else {
        return bad_request("missing image part".to_string());
    };
    let session = match session {
        Some(session) if !session.is_empty() => session,
        _ => return bad_request("missing sessionId".to_string()),
    };
    if !state.registry.lock().await.has_session(&session) {
        tracing::warn!(%session, "upload for a session the hub did not issue");
    }

    let filename = image
        .filename
        .unwrap_or_else(|| format!("{session}-{}.png", chrono::Utc::now().timestamp_millis()));

    match state.storage.save(&session, &filename, &image.bytes).await {
        Ok(receipt) => (StatusCode::OK, Json(UploadResponse::from(receipt))),
        Err(crate::Error::Upload(reason)) => bad_request(reason),
        Err(e) => {
            tracing::error!(%filename, error = %e, "cannot store upload");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(UploadResponse::failed(e.to_string())),
            )
        }
    }
}
