//! Asset storage
//!
//! The Capture Device uploads each shot to the hub's `/upload-image`
//! endpoint; the Print Device downloads the archival link before printing.
//! [`LocalStorage`] is the hub-side store behind the upload endpoint.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::{Error, Result};

/// Upload endpoint path on the hub
pub const UPLOAD_PATH: &str = "/upload-image";

/// Path images are served under
pub const IMAGES_PATH: &str = "/images";

/// User agent sent with asset downloads
pub const USER_AGENT: &str = "Mozilla/5.0";

const PREVIEW_WIDTH: u32 = 480;

/// JSON body returned by the upload endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Where an uploaded shot can be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub link: String,
    pub preview_link: Option<String>,
}

impl UploadResponse {
    /// Failure body with a reason
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Turn a response into a receipt
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upload`] unless the body reports success with a link
    pub fn into_receipt(self) -> Result<UploadReceipt> {
        match (self.success, self.link) {
            (true, Some(link)) if !link.is_empty() => Ok(UploadReceipt {
                link,
                preview_link: self.preview_link,
            }),
            _ => Err(Error::Upload(
                self.error
                    .unwrap_or_else(|| "upload rejected without a link".to_string()),
            )),
        }
    }
}

impl From<UploadReceipt> for UploadResponse {
    fn from(receipt: UploadReceipt) -> Self {
        Self {
            success: true,
            link: Some(receipt.link),
            preview_link: receipt.preview_link,
            error: None,
        }
    }
}

/// Sends captured shots to storage
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, session: &str, filename: &str, png: Vec<u8>) -> Result<UploadReceipt>;
}

/// Fetches assets to a local path
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download `url` into `dest`, returning the byte count
    async fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Multipart upload to the hub
pub struct HttpUploader {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpUploader {
    /// Uploader posting to `<hub_url>/upload-image`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(hub_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{UPLOAD_PATH}", hub_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, session: &str, filename: &str, png: Vec<u8>) -> Result<UploadReceipt> {
        let size = png.len();
        let image = reqwest::multipart::Part::bytes(png)
            .file_name(filename.to_string())
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new()
            .part("image", image)
            .text("sessionId", session.to_string());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body: UploadResponse = response.json().await.map_err(|e| {
            Error::Upload(format!("unreadable upload response ({status}): {e}"))
        })?;
        tracing::debug!(filename, size, success = body.success, "upload response");
        body.into_receipt()
    }
}

/// Streaming HTTP download with a fixed timeout
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| Error::Download(e.to_string()))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Download(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

/// Image store on the hub's disk, served under `/images`
#[derive(Debug, Clone)]
pub struct LocalStorage {
    dir: PathBuf,
    public_url: String,
}

impl LocalStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store an uploaded shot and its preview
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upload`] for an unsafe file name, or the IO error if
    /// the file cannot be written
    pub async fn save(&self, session: &str, filename: &str, bytes: &[u8]) -> Result<UploadReceipt> {
        if !is_safe_name(filename) {
            return Err(Error::Upload(format!("rejected file name '{filename}'")));
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(filename), bytes).await?;
        tracing::info!(session, filename, size = bytes.len(), "image stored");

        let preview_name = preview_name(filename);
        let preview_link = match make_preview(bytes.to_vec()).await {
            Ok(preview) => {
                tokio::fs::write(self.dir.join(&preview_name), preview).await?;
                Some(self.link(&preview_name))
            }
            Err(e) => {
                tracing::warn!(filename, error = %e, "preview not generated");
                None
            }
        };

        Ok(UploadReceipt {
            link: self.link(filename),
            preview_link,
        })
    }

    fn link(&self, name: &str) -> String {
        format!("{}{IMAGES_PATH}/{name}", self.public_url)
    }
}

/// Preview file name for a shot (`x.png` becomes `x-preview.webp`)
#[must_use]
pub fn preview_name(filename: &str) -> String {
    filename.strip_suffix(".png").map_or_else(
        || format!("{filename}-preview.webp"),
        |stem| format!("{stem}-preview.webp"),
    )
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

async fn make_preview(bytes: Vec<u8>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let image = image::load_from_memory(&bytes)
            .map_err(|e| Error::Render(format!("undecodable upload: {e}")))?;
        let preview = if image.width() > PREVIEW_WIDTH {
            image.resize(PREVIEW_WIDTH, u32::MAX, image::imageops::FilterType::Triangle)
        } else {
            image
        };
        let mut out = Cursor::new(Vec::new());
        preview
            .to_rgba8()
            .write_to(&mut out, ImageFormat::WebP)
            .map_err(|e| Error::Render(format!("webp encode failed: {e}")))?;
        Ok(out.into_inner())
    })
    .await
    .map_err(|e| Error::Render(format!("preview task failed: {e}")))?
}
