//! Camera backends for the Capture Device
//!
//! The station grabs stills on demand rather than streaming, so a backend only
//! needs to open at a resolution tier, grab one frame and release.

pub mod render;

use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use image::RgbaImage;
use tokio::process::Command;

use crate::config::CaptureConfig;
use crate::{Error, Result};

pub use render::{encode_png, render};

/// Resolution tier the camera was opened at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    /// Requested resolution as a hard minimum
    High { width: u32, height: u32 },
    /// Whatever the device offers by default
    Default,
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High { width, height } => write!(f, "high ({width}x{height})"),
            Self::Default => f.write_str("default"),
        }
    }
}

/// Still camera
#[async_trait]
pub trait Camera: Send + Sync {
    /// Open at a tier, failing if the device cannot satisfy it
    async fn open(&self, mode: CameraMode) -> Result<()>;

    /// Grab one frame from an opened camera
    async fn grab(&self) -> Result<RgbaImage>;

    /// Release the device
    async fn close(&self);
}

/// Open the camera at the high tier, falling back to the default tier
///
/// Returns the tier that worked, or `None` when both failed.
pub async fn acquire(camera: &dyn Camera, high: (u32, u32)) -> Option<CameraMode> {
    let high = CameraMode::High {
        width: high.0,
        height: high.1,
    };
    match camera.open(high).await {
        Ok(()) => {
            tracing::info!(mode = %high, "camera started");
            return Some(high);
        }
        Err(e) => tracing::warn!(error = %e, "high resolution failed, trying fallback"),
    }

    match camera.open(CameraMode::Default).await {
        Ok(()) => {
            tracing::info!(mode = %CameraMode::Default, "camera started");
            Some(CameraMode::Default)
        }
        Err(e) => {
            tracing::error!(error = %e, "camera failed completely");
            None
        }
    }
}

/// Camera driven through a still-capture program such as `fswebcam`
///
/// Each grab runs the program once and decodes the JPEG it writes to stdout.
pub struct CliCamera {
    program: String,
    device: String,
    mode: Mutex<Option<CameraMode>>,
}

impl CliCamera {
    #[must_use]
    pub fn new(program: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            device: device.into(),
            mode: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(&config.camera_program, &config.camera_device)
    }

    fn current_mode(&self) -> Option<CameraMode> {
        self.mode.lock().ok().and_then(|m| *m)
    }

    fn set_mode(&self, mode: Option<CameraMode>) {
        if let Ok(mut current) = self.mode.lock() {
            *current = mode;
        }
    }

    fn args(&self, mode: CameraMode) -> Vec<String> {
        let mut args = vec![
            "-d".to_string(),
            self.device.clone(),
            "--no-banner".to_string(),
            "-q".to_string(),
        ];
        if let CameraMode::High { width, height } = mode {
            args.push("-r".to_string());
            args.push(format!("{width}x{height}"));
        }
        args.extend(["--jpeg".to_string(), "95".to_string(), "-".to_string()]);
        args
    }

    async fn shoot(&self, mode: CameraMode) -> Result<RgbaImage> {
        let output = Command::new(&self.program)
            .args(self.args(mode))
            .output()
            .await
            .map_err(|e| Error::Camera(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Camera(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let frame = image::load_from_memory(&output.stdout)
            .map_err(|e| Error::Camera(format!("undecodable frame: {e}")))?
            .to_rgba8();

        if let CameraMode::High { width, height } = mode {
            if frame.width() < width || frame.height() < height {
                return Err(Error::Camera(format!(
                    "device delivered {}x{}, below {width}x{height}",
                    frame.width(),
                    frame.height()
                )));
            }
        }
        Ok(frame)
    }
}

#[async_trait]
impl Camera for CliCamera {
    async fn open(&self, mode: CameraMode) -> Result<()> {
        which::which(&self.program)
            .map_err(|_| Error::Camera(format!("{} not found in PATH", self.program)))?;
        self.shoot(mode).await?;
        self.set_mode(Some(mode));
        Ok(())
    }

    async fn grab(&self) -> Result<RgbaImage> {
        let mode = self
            .current_mode()
            .ok_or_else(|| Error::Camera("camera not open".to_string()))?;
        self.shoot(mode).await
    }

    async fn close(&self) {
        self.set_mode(None);
        tracing::debug!(device = %self.device, "camera released");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FlakyCamera {
        high_ok: bool,
        default_ok: bool,
        opens: AtomicUsize,
    }

    #[async_trait]
    impl Camera for FlakyCamera {
        async fn open(&self, mode: CameraMode) -> Result<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let ok = match mode {
                CameraMode::High { .. } => self.high_ok,
                CameraMode::Default => self.default_ok,
            };
            if ok {
                Ok(())
            } else {
                Err(Error::Camera("overconstrained".to_string()))
            }
        }

        async fn grab(&self) -> Result<RgbaImage> {
            Ok(RgbaImage::new(1, 1))
        }

        async fn close(&self) {}
    }

    fn flaky(high_ok: bool, default_ok: bool) -> FlakyCamera {
        FlakyCamera {
            high_ok,
            default_ok,
            opens: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn prefers_high_tier() {
        let cam = flaky(true, true);
        assert_eq!(
            acquire(&cam, (1920, 1080)).await,
            Some(CameraMode::High {
                width: 1920,
                height: 1080
            })
        );
        assert_eq!(cam.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_back_to_default() {
        let cam = flaky(false, true);
        assert_eq!(acquire(&cam, (1920, 1080)).await, Some(CameraMode::Default));
    }

    #[tokio::test]
    async fn both_tiers_failing_leaves_no_camera() {
        let cam = flaky(false, false);
        assert_eq!(acquire(&cam, (1920, 1080)).await, None);
        assert_eq!(cam.opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cli_arguments_per_tier() {
        let cam = CliCamera::new("fswebcam", "/dev/video2");
        let high = cam.args(CameraMode::High {
            width: 1920,
            height: 1080,
        });
        assert!(high.windows(2).any(|w| w == ["-r", "1920x1080"]));
        assert_eq!(high.last().map(String::as_str), Some("-"));
        assert!(!cam.args(CameraMode::Default).contains(&"-r".to_string()));
    }

    #[tokio::test]
    async fn grab_before_open_fails() {
        let cam = CliCamera::new("fswebcam", "/dev/video0");
        assert!(cam.grab().await.is_err());
    }
}
