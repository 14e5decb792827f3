//! Configuration management for the booth devices and the relay hub
//!
//! Every value resolves with the precedence env > TOML file > default.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::DeviceRole;
use crate::{Error, Result};

use file::BoothConfigFile;

/// Default hub base URL
pub const DEFAULT_HUB_URL: &str = "http://127.0.0.1:3000";

/// Default hub server port
pub const DEFAULT_PORT: u16 = 3000;

/// Default base URL for the QR hand-off page
pub const DEFAULT_QR_BASE_URL: &str = "https://sccl4c.web.app/";

/// Booth configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Relay hub connection
    pub hub: HubConfig,

    /// Device names on the hub
    pub devices: DeviceNames,

    /// Selector kiosk timing
    pub selector: SelectorConfig,

    /// Camera station
    pub capture: CaptureConfig,

    /// Printer station
    pub print: PrintConfig,

    /// Admin console
    pub admin: AdminConfig,

    /// Hub server
    pub server: ServerConfig,
}

/// Relay hub connection configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Base URL of the hub (http or https)
    pub url: String,

    /// Delay before reconnecting after a disconnect
    pub reconnect_delay: Duration,
}

/// Names each role announces in its `join`
#[derive(Debug, Clone)]
pub struct DeviceNames {
    pub selector: String,
    pub capture: String,
    pub print: String,
    pub admin: String,
}

impl DeviceNames {
    /// Name configured for a role
    #[must_use]
    pub fn name_for(&self, role: DeviceRole) -> &str {
        match role {
            DeviceRole::Selector => &self.selector,
            DeviceRole::Capture => &self.capture,
            DeviceRole::Print => &self.print,
            DeviceRole::Admin => &self.admin,
        }
    }

    /// Role for a configured name, if any
    #[must_use]
    pub fn role_of(&self, name: &str) -> Option<DeviceRole> {
        DeviceRole::ALL
            .into_iter()
            .find(|role| self.name_for(*role) == name)
    }
}

impl Default for DeviceNames {
    fn default() -> Self {
        Self {
            selector: DeviceRole::Selector.default_name().to_string(),
            capture: DeviceRole::Capture.default_name().to_string(),
            print: DeviceRole::Print.default_name().to_string(),
            admin: DeviceRole::Admin.default_name().to_string(),
        }
    }
}

/// Burst timing shared by the selector's sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstTiming {
    /// Length of each burst countdown in seconds
    pub countdown_secs: u32,

    /// Remaining seconds the skip control jumps to
    pub skip_to_secs: u32,

    /// Remaining seconds at which the camera is told to count down
    pub notify_at_secs: u32,

    /// Pause after each burst before the next one starts
    pub cooldown: Duration,
}

impl Default for BurstTiming {
    fn default() -> Self {
        Self {
            countdown_secs: 20,
            skip_to_secs: 6,
            notify_at_secs: 5,
            cooldown: Duration::from_secs(5),
        }
    }
}

impl BurstTiming {
    /// Check `countdown > skip_to > notify_at > 0`
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the violated ordering
    pub fn validate(&self) -> Result<()> {
        if self.notify_at_secs == 0 {
            return Err(Error::Config("notify_at_secs must be positive".to_string()));
        }
        if self.skip_to_secs <= self.notify_at_secs {
            return Err(Error::Config(format!(
                "skip_to_secs ({}) must exceed notify_at_secs ({})",
                self.skip_to_secs, self.notify_at_secs
            )));
        }
        if self.countdown_secs <= self.skip_to_secs {
            return Err(Error::Config(format!(
                "countdown_secs ({}) must exceed skip_to_secs ({})",
                self.countdown_secs, self.skip_to_secs
            )));
        }
        Ok(())
    }
}

/// Selector kiosk configuration
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Burst sequencer timing
    pub timing: BurstTiming,

    /// Delay before the kiosk resets itself after the review pages
    pub reset_after: Duration,

    /// Base URL encoded into the hand-off QR code
    pub qr_base_url: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            timing: BurstTiming::default(),
            reset_after: Duration::from_secs(120),
            qr_base_url: DEFAULT_QR_BASE_URL.to_string(),
        }
    }
}

/// Camera station configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Still-capture program invoked for each grab
    pub camera_program: String,

    /// Video device handed to the program
    pub camera_device: String,

    /// Delay before `:camera-ready` is re-announced after an upload attempt
    pub ready_delay: Duration,

    /// Preferred high-resolution mode
    pub high_resolution: (u32, u32),
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_program: "fswebcam".to_string(),
            camera_device: "/dev/video0".to_string(),
            ready_delay: Duration::from_secs(1),
            high_resolution: (1920, 1080),
        }
    }
}

/// Printer station configuration
#[derive(Debug, Clone)]
pub struct PrintConfig {
    /// Case-insensitive substrings identifying the target printer
    pub printer_match: Vec<String>,

    /// Directory downloaded assets are written to
    pub temp_dir: PathBuf,

    /// Delay before a downloaded asset is deleted
    pub cleanup_after: Duration,

    /// Timeout for the asset download
    pub download_timeout: Duration,

    /// Hold print requests until the purchase is confirmed
    pub require_purchase: bool,

    /// Paper size passed to the print backend
    pub media: String,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            printer_match: vec!["l4260".to_string(), "4260".to_string()],
            temp_dir: std::env::temp_dir().join("photobooth-print"),
            cleanup_after: Duration::from_secs(15),
            download_timeout: Duration::from_secs(60),
            require_purchase: true,
            media: "a4".to_string(),
        }
    }
}

/// Admin console configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Interval between `/auth-status` polls
    pub auth_poll: Duration,

    /// Devices shown in the online/offline panel
    pub tracked: Vec<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        let names = DeviceNames::default();
        Self {
            auth_poll: Duration::from_secs(8),
            tracked: vec![names.selector, names.capture, names.print, names.admin],
        }
    }
}

/// Hub server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Directory uploaded images are stored in
    pub storage_dir: PathBuf,

    /// Public base URL for stored image links; derived from the local address when unset
    pub public_url: Option<String>,

    /// Sign-in URL for `GET /auth`
    pub auth_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            storage_dir: default_data_dir().join("images"),
            public_url: None,
            auth_url: None,
        }
    }
}

/// Data directory (`~/.local/share/photobooth` on Linux)
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("photobooth"))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect()
    })
}

impl Config {
    /// Load configuration from the environment and the standard config file
    ///
    /// # Errors
    ///
    /// Returns error if the resolved burst timing is inconsistent
    pub fn load() -> Result<Self> {
        Self::from_file(file::load_config_file())
    }

    /// Resolve configuration from a parsed file overlaid by the environment
    ///
    /// # Errors
    ///
    /// Returns error if the resolved burst timing is inconsistent
    pub fn from_file(fc: BoothConfigFile) -> Result<Self> {
        let defaults_selector = SelectorConfig::default();
        let defaults_capture = CaptureConfig::default();
        let defaults_print = PrintConfig::default();
        let defaults_admin = AdminConfig::default();
        let defaults_server = ServerConfig::default();
        let default_names = DeviceNames::default();

        let hub = HubConfig {
            url: std::env::var("BOOTH_HUB_URL")
                .ok()
                .or(fc.hub.url)
                .unwrap_or_else(|| DEFAULT_HUB_URL.to_string()),
            reconnect_delay: Duration::from_secs(
                env_parse("BOOTH_RECONNECT_SECS")
                    .or(fc.hub.reconnect_secs)
                    .unwrap_or(3),
            ),
        };

        let devices = DeviceNames {
            selector: std::env::var("BOOTH_SELECTOR_NAME")
                .ok()
                .or(fc.devices.selector)
                .unwrap_or(default_names.selector),
            capture: std::env::var("BOOTH_CAPTURE_NAME")
                .ok()
                .or(fc.devices.capture)
                .unwrap_or(default_names.capture),
            print: std::env::var("BOOTH_PRINT_NAME")
                .ok()
                .or(fc.devices.print)
                .unwrap_or(default_names.print),
            admin: std::env::var("BOOTH_ADMIN_NAME")
                .ok()
                .or(fc.devices.admin)
                .unwrap_or(default_names.admin),
        };

        let default_timing = defaults_selector.timing;
        let timing = BurstTiming {
            countdown_secs: env_parse("BOOTH_COUNTDOWN_SECS")
                .or(fc.selector.countdown_secs)
                .unwrap_or(default_timing.countdown_secs),
            skip_to_secs: fc
                .selector
                .skip_to_secs
                .unwrap_or(default_timing.skip_to_secs),
            notify_at_secs: fc
                .selector
                .notify_at_secs
                .unwrap_or(default_timing.notify_at_secs),
            cooldown: fc
                .selector
                .cooldown_secs
                .map_or(default_timing.cooldown, Duration::from_secs),
        };
        timing.validate()?;

        let selector = SelectorConfig {
            timing,
            reset_after: fc
                .selector
                .reset_secs
                .map_or(defaults_selector.reset_after, Duration::from_secs),
            qr_base_url: std::env::var("BOOTH_QR_BASE_URL")
                .ok()
                .or(fc.selector.qr_base_url)
                .unwrap_or(defaults_selector.qr_base_url),
        };

        let capture = CaptureConfig {
            camera_program: std::env::var("BOOTH_CAMERA_PROGRAM")
                .ok()
                .or(fc.capture.camera_program)
                .unwrap_or(defaults_capture.camera_program),
            camera_device: std::env::var("BOOTH_CAMERA_DEVICE")
                .ok()
                .or(fc.capture.camera_device)
                .unwrap_or(defaults_capture.camera_device),
            ready_delay: fc
                .capture
                .ready_delay_ms
                .map_or(defaults_capture.ready_delay, Duration::from_millis),
            high_resolution: (
                fc.capture
                    .high_width
                    .unwrap_or(defaults_capture.high_resolution.0),
                fc.capture
                    .high_height
                    .unwrap_or(defaults_capture.high_resolution.1),
            ),
        };

        let print = PrintConfig {
            printer_match: env_list("BOOTH_PRINTER_MATCH")
                .or(fc.print.printer_match)
                .filter(|list| !list.is_empty())
                .unwrap_or(defaults_print.printer_match),
            temp_dir: std::env::var("BOOTH_PRINT_TEMP_DIR")
                .ok()
                .or(fc.print.temp_dir)
                .map_or(defaults_print.temp_dir, PathBuf::from),
            cleanup_after: fc
                .print
                .cleanup_secs
                .map_or(defaults_print.cleanup_after, Duration::from_secs),
            download_timeout: fc
                .print
                .download_timeout_secs
                .map_or(defaults_print.download_timeout, Duration::from_secs),
            require_purchase: env_parse("BOOTH_REQUIRE_PURCHASE")
                .or(fc.print.require_purchase)
                .unwrap_or(defaults_print.require_purchase),
            media: fc.print.media.unwrap_or(defaults_print.media),
        };

        let admin = AdminConfig {
            auth_poll: fc
                .admin
                .auth_poll_secs
                .map_or(defaults_admin.auth_poll, Duration::from_secs),
            tracked: fc.admin.tracked.unwrap_or_else(|| {
                vec![
                    devices.selector.clone(),
                    devices.capture.clone(),
                    devices.print.clone(),
                    devices.admin.clone(),
                ]
            }),
        };

        let server = ServerConfig {
            port: env_parse("BOOTH_PORT")
                .or_else(|| env_parse("PORT"))
                .or(fc.server.port)
                .unwrap_or(defaults_server.port),
            storage_dir: std::env::var("BOOTH_STORAGE_DIR")
                .ok()
                .or(fc.server.storage_dir)
                .map_or(defaults_server.storage_dir, PathBuf::from),
            public_url: std::env::var("BOOTH_PUBLIC_URL")
                .ok()
                .or(fc.server.public_url),
            auth_url: std::env::var("BOOTH_AUTH_URL").ok().or(fc.server.auth_url),
        };

        Ok(Self {
            hub,
            devices,
            selector,
            capture,
            print,
            admin,
            server,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub: HubConfig {
                url: DEFAULT_HUB_URL.to_string(),
                reconnect_delay: Duration::from_secs(3),
            },
            devices: DeviceNames::default(),
            selector: SelectorConfig::default(),
            capture: CaptureConfig::default(),
            print: PrintConfig::default(),
            admin: AdminConfig::default(),
            server: ServerConfig::default(),
        }
    }
}
