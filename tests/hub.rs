//! Relay hub integration tests

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use photobooth::protocol::{ChatMessage, CommandResponse};
use photobooth::{Command, DeviceIdentity, DeviceRole, HubClient, HubEvent, HubFrame, HubHandle};
use tokio::net::TcpListener;
use tower::ServiceExt;

mod common;
use common::{BOUNDARY, test_hub, test_png, upload_body, within};

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn upload(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload-image")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (hub, _dir) = test_hub();
    let response = hub.router().oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_ready_reports_storage_and_stations() {
    let (hub, _dir) = test_hub();
    let response = hub.router().oneshot(get("/ready")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["checks"]["storage"]["status"], "ok");
    assert_eq!(json["checks"]["stations"], serde_json::json!([]));
}

#[tokio::test]
async fn test_auth_status_is_signed_out() {
    let (hub, _dir) = test_hub();
    let response = hub.router().oneshot(get("/auth-status")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["googleDriveAuthenticated"], false);
}

#[tokio::test]
async fn test_auth_without_sign_in_page() {
    let (hub, _dir) = test_hub();
    let response = hub.router().oneshot(get("/auth")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_auth_redirects_to_sign_in_page() {
    let dir = tempfile::tempdir().unwrap();
    let hub = photobooth::HubServerBuilder::new(0, dir.path())
        .auth_url("https://accounts.example/sign-in")
        .build();
    let response = hub.router().oneshot(get("/auth")).await.unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://accounts.example/sign-in"
    );
}

#[tokio::test]
async fn test_upload_stores_image_and_preview() {
    let (hub, dir) = test_hub();
    let body = upload_body(Some("sess-1"), "sess-1-1700000000000.png", &test_png());
    let response = hub.router().oneshot(upload(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(
        json["link"],
        "http://booth.test/images/sess-1-1700000000000.png"
    );
    assert_eq!(
        json["previewLink"],
        "http://booth.test/images/sess-1-1700000000000-preview.webp"
    );
    assert!(dir.path().join("sess-1-1700000000000.png").exists());
    assert!(dir.path().join("sess-1-1700000000000-preview.webp").exists());
}

#[tokio::test]
async fn test_uploaded_image_is_served() {
    let (hub, _dir) = test_hub();
    let router = hub.router();
    let png = test_png();
    let response = router
        .clone()
        .oneshot(upload(upload_body(Some("s"), "s-1.png", &png)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router.oneshot(get("/images/s-1.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body.as_ref(), png.as_slice());
}

#[tokio::test]
async fn test_upload_without_session_is_rejected() {
    let (hub, dir) = test_hub();
    let body = upload_body(None, "orphan.png", &test_png());
    let response = hub.router().oneshot(upload(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("sessionId"));
    assert!(!dir.path().join("orphan.png").exists());
}

#[tokio::test]
async fn test_upload_with_unsafe_name_is_rejected() {
    let (hub, _dir) = test_hub();
    let body = upload_body(Some("s"), "../escape.png", &test_png());
    let response = hub.router().oneshot(upload(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

async fn spawn_hub() -> (String, tempfile::TempDir) {
    let (hub, dir) = test_hub();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(hub.serve(listener));
    (url, dir)
}

fn join(url: &str, role: DeviceRole) -> HubHandle {
    HubClient::new(url, &DeviceIdentity::for_role(role), Duration::from_millis(100))
        .unwrap()
        .spawn()
}

/// Next frame matching `pred`, skipping connection events and others
async fn next_frame(handle: &mut HubHandle, pred: impl Fn(&HubFrame) -> bool) -> HubFrame {
    within(async {
        loop {
            match handle.recv().await {
                Some(HubEvent::Frame(frame)) if pred(&frame) => return frame,
                Some(_) => {}
                None => panic!("hub client stopped"),
            }
        }
    })
    .await
}

#[tokio::test]
async fn test_capture_join_gets_session_id() {
    let (url, _dir) = spawn_hub().await;
    let mut capture = join(&url, DeviceRole::Capture);

    let frame = next_frame(&mut capture, |f| matches!(f, HubFrame::SessionId(_))).await;
    let HubFrame::SessionId(session) = frame else {
        unreachable!()
    };
    assert!(!session.is_empty());
}

#[tokio::test]
async fn test_join_is_announced_with_roster() {
    let (url, _dir) = spawn_hub().await;
    let mut selector = join(&url, DeviceRole::Selector);
    next_frame(&mut selector, |f| matches!(f, HubFrame::UserJoined(p) if p.name == "Selector")).await;

    let _print = join(&url, DeviceRole::Print);
    let frame = next_frame(&mut selector, |f| matches!(f, HubFrame::UserJoined(p) if p.name == "Print")).await;
    let HubFrame::UserJoined(presence) = frame else {
        unreachable!()
    };
    let mut names: Vec<_> = presence.users.iter().map(|u| u.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["Print", "Selector"]);
}

#[tokio::test]
async fn test_chat_fans_out_and_replies_are_routed() {
    let (url, _dir) = spawn_hub().await;
    let mut admin = join(&url, DeviceRole::Admin);
    next_frame(&mut admin, |f| matches!(f, HubFrame::UserJoined(p) if p.name == "Admin")).await;
    let mut print = join(&url, DeviceRole::Print);
    next_frame(&mut print, |f| matches!(f, HubFrame::UserJoined(p) if p.name == "Print")).await;
    let mut selector = join(&url, DeviceRole::Selector);
    next_frame(&mut selector, |f| matches!(f, HubFrame::UserJoined(p) if p.name == "Selector")).await;

    selector.send(HubFrame::command_message(
        "Selector",
        &Command::Print {
            link: "http://booth.test/images/a.png".to_string(),
        },
    ));
    let frame = next_frame(&mut print, |f| matches!(f, HubFrame::Chat(_))).await;
    assert_eq!(
        frame,
        HubFrame::Chat(ChatMessage {
            name: "Selector".to_string(),
            msg: ":print-http://booth.test/images/a.png".to_string(),
        })
    );

    print.send(HubFrame::CommandResponse(CommandResponse {
        to: "Admin".to_string(),
        from: "Print".to_string(),
        response: "no jobs".to_string(),
    }));
    let frame = next_frame(&mut admin, |f| matches!(f, HubFrame::CommandResponse(_))).await;
    let HubFrame::CommandResponse(reply) = frame else {
        unreachable!()
    };
    assert_eq!(reply.response, "no jobs");
}

#[tokio::test]
async fn test_departure_is_announced() {
    let (url, _dir) = spawn_hub().await;
    let mut admin = join(&url, DeviceRole::Admin);
    next_frame(&mut admin, |f| matches!(f, HubFrame::UserJoined(p) if p.name == "Admin")).await;
    let print = join(&url, DeviceRole::Print);
    next_frame(&mut admin, |f| matches!(f, HubFrame::UserJoined(p) if p.name == "Print")).await;

    drop(print);
    let frame = next_frame(&mut admin, |f| matches!(f, HubFrame::UserLeft(_))).await;
    let HubFrame::UserLeft(presence) = frame else {
        unreachable!()
    };
    assert_eq!(presence.name, "Print");
    assert!(presence.users.iter().all(|u| u.name != "Print"));
}
