//! Shared test utilities

#![allow(dead_code)]

use std::time::Duration;

use photobooth::camera::encode_png;
use photobooth::{HubServer, HubServerBuilder};
use tempfile::TempDir;

/// Multipart boundary used by [`upload_body`]
pub const BOUNDARY: &str = "photobooth-test-boundary";

/// Build a hub storing images in a fresh temp dir
#[must_use]
pub fn test_hub() -> (HubServer, TempDir) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let hub = HubServerBuilder::new(0, dir.path())
        .public_url("http://booth.test")
        .build();
    (hub, dir)
}

/// A small solid PNG
#[must_use]
pub fn test_png() -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(8, 6, image::Rgba([200, 40, 40, 255]));
    encode_png(&image).expect("failed to encode test png")
}

/// Multipart body for `/upload-image`
#[must_use]
pub fn upload_body(session: Option<&str>, filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(b"\r\n");
    if let Some(session) = session {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"sessionId\"\r\n\r\n{session}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Wait for `fut`, failing the test after a few seconds
pub async fn within<F: std::future::Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}
