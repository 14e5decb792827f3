//! Relay hub server
//!
//! One websocket endpoint the stations join, plus the small REST surface
//! they use around it: image upload, archive sign-in status and health.

mod auth;
pub mod health;
pub mod upload;
pub mod websocket;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::{Config, DeviceNames};
use crate::nodes::NodeRegistry;
use crate::storage::{IMAGES_PATH, LocalStorage};
use crate::Result;

pub use auth::{AUTH_STATUS_PATH, AuthStatus};

/// Shared connection registry
pub type SharedNodeRegistry = Arc<Mutex<NodeRegistry>>;

/// Shared state for hub handlers
#[derive(Debug, Clone)]
pub struct HubState {
    pub registry: SharedNodeRegistry,
    pub devices: DeviceNames,
    pub storage: LocalStorage,
    /// Archive sign-in page `/auth` redirects to
    pub auth_url: Option<String>,
    /// `host:port` announced to joining stations
    pub address: String,
}

/// Configuration for building a hub server
#[derive(Debug, Clone)]
pub struct HubServerBuilder {
    port: u16,
    storage_dir: PathBuf,
    public_url: Option<String>,
    auth_url: Option<String>,
    devices: DeviceNames,
}

impl HubServerBuilder {
    #[must_use]
    pub fn new(port: u16, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            port,
            storage_dir: storage_dir.into(),
            public_url: None,
            auth_url: None,
            devices: DeviceNames::default(),
        }
    }

    /// Builder seeded from the `[server]` and `[devices]` settings
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            port: config.server.port,
            storage_dir: config.server.storage_dir.clone(),
            public_url: config.server.public_url.clone(),
            auth_url: config.server.auth_url.clone(),
            devices: config.devices.clone(),
        }
    }

    /// Base URL image links are built from
    #[must_use]
    pub fn public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn devices(mut self, devices: DeviceNames) -> Self {
        self.devices = devices;
        self
    }

    #[must_use]
    pub fn build(self) -> HubServer {
        let address = lan_address(self.port);
        let public_url = self
            .public_url
            .unwrap_or_else(|| format!("http://{address}"));
        tracing::debug!(%public_url, storage = %self.storage_dir.display(), "hub storage");

        let state = Arc::new(HubState {
            registry: Arc::new(Mutex::new(NodeRegistry::new())),
            devices: self.devices,
            storage: LocalStorage::new(self.storage_dir, public_url),
            auth_url: self.auth_url,
            address,
        });

        HubServer {
            state,
            port: self.port,
        }
    }
}

/// Hub server
pub struct HubServer {
    state: Arc<HubState>,
    port: u16,
}

impl HubServer {
    #[must_use]
    pub fn state(&self) -> Arc<HubState> {
        self.state.clone()
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let images = ServeDir::new(self.state.storage.dir());

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .merge(websocket::router(self.state.clone()))
            .merge(upload::router(self.state.clone()))
            .merge(auth::router(self.state.clone()))
            .merge(health::router(self.state.clone()))
            .nest_service(IMAGES_PATH, images)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the hub server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind hub server: {e}")))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener
    ///
    /// # Errors
    ///
    /// Returns error if the server fails while running
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener
            .local_addr()
            .map_or_else(|_| "unknown".to_string(), |a: SocketAddr| a.to_string());
        tracing::info!(addr = %local, lan = %self.state.address, "hub listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("hub server error: {e}")))?;

        Ok(())
    }

    /// Run the hub server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// `ip:port` of this machine on the local network
fn lan_address(port: u16) -> String {
    match local_ip_address::local_ip() {
        Ok(ip) => format!("{ip}:{port}"),
        Err(e) => {
            tracing::warn!(error = %e, "cannot determine LAN address");
            format!("127.0.0.1:{port}")
        }
    }
}
