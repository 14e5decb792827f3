//! Error types for the photo booth runtimes

use thiserror::Error;

/// Result type alias for booth operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the booth devices and the relay hub
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Relay hub connection or framing error
    #[error("hub error: {0}")]
    Hub(String),

    /// Command codec error
    #[error("protocol error: {0}")]
    Protocol(#[from] crate::protocol::DecodeError),

    /// Camera acquisition or capture error
    #[error("camera error: {0}")]
    Camera(String),

    /// Frame rendering or encoding error
    #[error("render error: {0}")]
    Render(String),

    /// Upload to the storage backend failed
    #[error("upload error: {0}")]
    Upload(String),

    /// Asset download failed
    #[error("download error: {0}")]
    Download(String),

    /// Printer discovery or job submission error
    #[error("print error: {0}")]
    Print(String),

    /// Operation not valid in the current device state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
