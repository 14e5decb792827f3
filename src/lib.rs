//! Photobooth - coordination protocol for a multi-station photo booth
//!
//! Four stations cooperate through a relay hub:
//! - Selector: the guest kiosk (frame, filter, capture bursts, review, purchase)
//! - Capture: the camera (render, upload, hand-off of the result)
//! - Print: downloads the result and sends it to the local printer
//! - Admin: operator console with remote commands
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐
//! │ Selector │  │ Capture  │  │  Print   │  │  Admin   │
//! └────┬─────┘  └────┬─────┘  └────┬─────┘  └────┬─────┘
//!      │  chat message / command / command response │
//! ┌────▼─────────────▼─────────────▼─────────────▼──────┐
//! │                  Relay Hub  (/hub)                    │
//! │   roster  │  session ids  │  /upload-image  │ /images │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Stations are sans-IO state machines ([`devices`]) driven by small
//! runtime loops; every timer goes through [`timer::Scheduler`] so the
//! machines run on a virtual clock in tests.

pub mod api;
pub mod camera;
pub mod config;
pub mod devices;
pub mod error;
pub mod nodes;
pub mod printing;
pub mod protocol;
pub mod relay;
pub mod remote;
pub mod sequencer;
pub mod storage;
pub mod timer;

pub use api::{HubServer, HubServerBuilder};
pub use config::Config;
pub use devices::{Admin, Capture, Print, Selector};
pub use error::{Error, Result};
pub use protocol::{Command, DeviceIdentity, DeviceRole, FilterSpec, HubFrame};
pub use relay::{HubClient, HubEvent, HubHandle};
pub use sequencer::BurstSequencer;
pub use timer::{ManualScheduler, Scheduler, TimerId, TokioScheduler};
