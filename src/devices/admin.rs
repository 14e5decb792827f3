//! Admin Device: operator console
//!
//! Tracks which stations are online, keeps a typed console log and sends
//! remote commands and chat to the hub.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::config::AdminConfig;
use crate::protocol::{ChatMessage, CommandResponse, DeviceIdentity, HubFrame, Presence};
use crate::remote::{CommandTable, no_args};

const CONSOLE_CAPACITY: usize = 500;

/// Console entry category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Command,
    Response,
    Error,
    Join,
    Leave,
    Chat,
    Server,
}

impl LogKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Response => "response",
            Self::Error => "error",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Chat => "chat",
            Self::Server => "server",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub kind: LogKind,
    pub text: String,
}

/// Online state of a tracked station
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationStatus {
    pub name: String,
    pub online: bool,
}

/// Output for the owning loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminEffect {
    Send(HubFrame),
    /// Print a console entry
    Show(LogEntry),
    /// Wipe the visible console
    Clear,
}

pub struct Admin {
    identity: DeviceIdentity,
    stations: Vec<StationStatus>,
    console: VecDeque<LogEntry>,
    hub_address: Option<String>,
    archive_authenticated: Option<bool>,
    outbox: Vec<AdminEffect>,
}

impl Admin {
    #[must_use]
    pub fn new(identity: DeviceIdentity, config: &AdminConfig) -> Self {
        let stations = config
            .tracked
            .iter()
            .map(|name| StationStatus {
                name: name.clone(),
                online: false,
            })
            .collect();
        Self {
            identity,
            stations,
            console: VecDeque::new(),
            hub_address: None,
            archive_authenticated: None,
            outbox: Vec::new(),
        }
    }

    #[must_use]
    pub const fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    #[must_use]
    pub fn stations(&self) -> &[StationStatus] {
        &self.stations
    }

    #[must_use]
    pub fn is_online(&self, name: &str) -> bool {
        self.stations.iter().any(|s| s.name == name && s.online)
    }

    #[must_use]
    pub const fn console(&self) -> &VecDeque<LogEntry> {
        &self.console
    }

    #[must_use]
    pub fn hub_address(&self) -> Option<&str> {
        self.hub_address.as_deref()
    }

    pub fn take_effects(&mut self) -> Vec<AdminEffect> {
        std::mem::take(&mut self.outbox)
    }

    /// Send a remote command line (`expr` or `expr -> target`)
    ///
    /// `clear` and `help` run locally and are not sent.
    pub fn send_command(&mut self, raw: &str) {
        let raw = raw.trim();
        match raw {
            "" => {}
            "clear" => {
                self.console.clear();
                self.outbox.push(AdminEffect::Clear);
            }
            "help" => self.log(
                LogKind::Server,
                "local: clear, help. remote: help, status, session, identity \
                 (all); reload, skip, state (Selector); ready, stop, capture, \
                 filter (Capture); jobs, printers-match (Print). \
                 Append `-> Name` to target one station."
                    .to_string(),
            ),
            _ => {
                self.log(LogKind::Command, raw.to_string());
                self.outbox.push(AdminEffect::Send(HubFrame::Command(raw.to_string())));
            }
        }
    }

    /// Broadcast a chat line
    pub fn send_message(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.outbox.push(AdminEffect::Send(HubFrame::Chat(ChatMessage {
            name: self.identity.name().to_string(),
            msg: text.to_string(),
        })));
    }

    /// Frame received from the hub
    pub fn on_frame(&mut self, frame: HubFrame) {
        match frame {
            HubFrame::UserJoined(presence) => {
                self.apply_presence(&presence, true);
                self.log(LogKind::Join, format!("{} joined", presence.name));
            }
            HubFrame::UserLeft(presence) => {
                self.apply_presence(&presence, false);
                self.log(LogKind::Leave, format!("{} left", presence.name));
            }
            HubFrame::CommandResponse(response) => self.on_response(response),
            HubFrame::Chat(ChatMessage { name, msg }) => {
                self.log(LogKind::Chat, format!("{name}: {msg}"));
            }
            HubFrame::Ip(hint) => {
                tracing::info!(address = %hint.full, "hub address");
                self.log(LogKind::Server, format!("hub reachable at {}", hint.full));
                self.hub_address = Some(hint.full);
            }
            HubFrame::Join(_) | HubFrame::Command(_) | HubFrame::SessionId(_) => {}
        }
    }

    /// Hub connection dropped: nothing is known to be online any more
    pub fn on_disconnected(&mut self) {
        for station in &mut self.stations {
            station.online = false;
        }
        self.log(LogKind::Server, "disconnected from hub".to_string());
    }

    /// Result of an `/auth-status` poll
    pub fn auth_status(&mut self, authenticated: crate::Result<bool>) {
        match authenticated {
            Ok(now) if self.archive_authenticated != Some(now) => {
                self.archive_authenticated = Some(now);
                let text = if now {
                    "archive storage signed in"
                } else {
                    "archive storage not signed in"
                };
                self.log(LogKind::Server, text.to_string());
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "auth status unavailable"),
        }
    }

    fn on_response(&mut self, response: CommandResponse) {
        if response.to != self.identity.name() {
            return;
        }
        let kind = if response.response.starts_with("Error:") {
            LogKind::Error
        } else {
            LogKind::Response
        };
        self.log(kind, format!("{}: {}", response.from, response.response));
    }

    fn apply_presence(&mut self, presence: &Presence, joined: bool) {
        for station in &mut self.stations {
            if presence.users.is_empty() {
                if station.name == presence.name {
                    station.online = joined;
                }
            } else {
                station.online = presence.users.iter().any(|u| u.name == station.name);
            }
        }
    }

    fn log(&mut self, kind: LogKind, text: String) {
        let entry = LogEntry {
            at: Utc::now(),
            kind,
            text,
        };
        if self.console.len() == CONSOLE_CAPACITY {
            self.console.pop_front();
        }
        self.console.push_back(entry.clone());
        self.outbox.push(AdminEffect::Show(entry));
    }
}

/// Remote commands the console answers
#[must_use]
pub fn commands() -> CommandTable<Admin> {
    CommandTable::<Admin>::new()
        .with("status", "online stations", |a, args| {
            no_args(args)?;
            Ok(a.stations
                .iter()
                .map(|s| format!("{} {}", s.name, if s.online { "online" } else { "offline" }))
                .collect::<Vec<_>>()
                .join(", "))
        })
        .with("session", "session id", |_, args| {
            no_args(args)?;
            Ok("none".to_string())
        })
        .with("identity", "hub name and room", |a, args| {
            no_args(args)?;
            Ok(format!("{} {}", a.identity.name(), a.identity.room()))
        })
}
