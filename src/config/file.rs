//! TOML configuration file loading
//!
//! Supports `~/.config/photobooth/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct BoothConfigFile {
    /// Relay hub connection settings
    #[serde(default)]
    pub hub: HubFileConfig,

    /// Device names as they appear on the hub
    #[serde(default)]
    pub devices: DevicesFileConfig,

    /// Selector kiosk timing
    #[serde(default)]
    pub selector: SelectorFileConfig,

    /// Camera station settings
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Printer station settings
    #[serde(default)]
    pub print: PrintFileConfig,

    /// Admin console settings
    #[serde(default)]
    pub admin: AdminFileConfig,

    /// Hub server settings
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Relay hub connection settings
#[derive(Debug, Default, Deserialize)]
pub struct HubFileConfig {
    /// Base URL of the hub (e.g. "http://192.168.1.100:3000")
    pub url: Option<String>,

    /// Seconds to wait before reconnecting after a disconnect
    pub reconnect_secs: Option<u64>,
}

/// Device names
#[derive(Debug, Default, Deserialize)]
pub struct DevicesFileConfig {
    pub selector: Option<String>,
    pub capture: Option<String>,
    pub print: Option<String>,
    pub admin: Option<String>,
}

/// Selector kiosk timing
#[derive(Debug, Default, Deserialize)]
pub struct SelectorFileConfig {
    pub countdown_secs: Option<u32>,
    pub skip_to_secs: Option<u32>,
    pub notify_at_secs: Option<u32>,
    pub cooldown_secs: Option<u64>,
    pub reset_secs: Option<u64>,
    pub qr_base_url: Option<String>,
}

/// Camera station settings
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Still-capture program (e.g. "fswebcam")
    pub camera_program: Option<String>,
    /// Video device passed to the capture program
    pub camera_device: Option<String>,
    pub ready_delay_ms: Option<u64>,
    pub high_width: Option<u32>,
    pub high_height: Option<u32>,
}

/// Printer station settings
#[derive(Debug, Default, Deserialize)]
pub struct PrintFileConfig {
    /// Case-insensitive substrings identifying the target printer
    pub printer_match: Option<Vec<String>>,
    pub temp_dir: Option<String>,
    pub cleanup_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
    pub require_purchase: Option<bool>,
    pub media: Option<String>,
}

/// Admin console settings
#[derive(Debug, Default, Deserialize)]
pub struct AdminFileConfig {
    pub auth_poll_secs: Option<u64>,
    /// Devices shown in the status panel
    pub tracked: Option<Vec<String>>,
}

/// Hub server settings
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,
    /// Directory uploaded images are stored in
    pub storage_dir: Option<String>,
    /// Public base URL for links to stored images
    pub public_url: Option<String>,
    /// Sign-in URL `GET /auth` redirects to
    pub auth_url: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `BoothConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> BoothConfigFile {
    config_file_path().map_or_else(BoothConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or unparsable files yield the defaults.
pub fn load_from(path: &Path) -> BoothConfigFile {
    if !path.exists() {
        return BoothConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                BoothConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            BoothConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/photobooth/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("photobooth").join("config.toml"))
}
