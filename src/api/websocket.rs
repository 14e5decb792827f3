//! `/hub` websocket: join, fan-out and routed replies

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::HubState;
use crate::nodes::ConnectionId;
use crate::protocol::{DeviceRole, HubFrame, IpHint, Presence};
use crate::relay::HUB_PATH;

/// Build the websocket route
pub fn router(state: Arc<HubState>) -> Router {
    Router::new()
        .route(HUB_PATH, get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(State(state): State<Arc<HubState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<HubState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<HubFrame>();
    let id = state.registry.lock().await.connect(tx);
    tracing::debug!(conn = %id, "station connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match frame.to_text() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(event = frame.event(), error = %e, "unencodable frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match HubFrame::from_text(&text) {
                    Ok(frame) => handle_frame(&recv_state, id, frame).await,
                    Err(e) => tracing::debug!(conn = %id, error = %e, "ignoring unknown frame"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    let mut registry = state.registry.lock().await;
    let Some(session) = registry.disconnect(id) else {
        return;
    };
    match session.entry {
        Some(entry) => {
            tracing::info!(name = %entry.name, "station left");
            registry.broadcast(&HubFrame::UserLeft(Presence {
                name: entry.name,
                users: registry.roster(),
            }));
        }
        None => tracing::debug!(conn = %id, "connection closed before join"),
    }
}

async fn handle_frame(state: &HubState, id: ConnectionId, frame: HubFrame) {
    let mut registry = state.registry.lock().await;
    match frame {
        HubFrame::Join(join) => {
            let name = join.name.clone();
            if !registry.join(id, join) {
                return;
            }
            tracing::info!(%name, "station joined");
            registry.broadcast(&HubFrame::UserJoined(Presence {
                name: name.clone(),
                users: registry.roster(),
            }));
            registry.send_to(
                id,
                HubFrame::Ip(IpHint {
                    full: state.address.clone(),
                }),
            );
            if state.devices.role_of(&name) == Some(DeviceRole::Capture) {
                if let Some(session) = registry.issue_session(id) {
                    tracing::info!(%name, %session, "session issued");
                    registry.send_to(id, HubFrame::SessionId(session));
                }
            }
        }
        HubFrame::Chat(_) | HubFrame::Command(_) => {
            let delivered = registry.broadcast(&frame);
            tracing::trace!(event = frame.event(), delivered, "fan-out");
        }
        HubFrame::CommandResponse(ref response) => {
            if registry.send_to_name(&response.to, &frame) == 0 {
                tracing::debug!(to = %response.to, "command response has no recipient");
            }
        }
        other => tracing::debug!(conn = %id, event = other.event(), "unexpected frame from station"),
    }
}
