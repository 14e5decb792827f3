//! Registry types

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::RosterEntry;

/// Hub-assigned connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn_{}", self.0.simple())
    }
}

/// One connected device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSession {
    pub id: ConnectionId,
    /// Set once the device has joined
    pub entry: Option<RosterEntry>,
    /// Capture session issued on join
    pub session_id: Option<String>,
    pub connected_at: DateTime<Utc>,
}

impl NodeSession {
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.entry.as_ref().map(|e| e.name.as_str())
    }
}
