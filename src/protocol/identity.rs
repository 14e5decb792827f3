//! Device roles and hub identities

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the four coordinating roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// Touch kiosk the guest drives
    Selector,
    /// Camera station
    Capture,
    /// Printer station
    Print,
    /// Operator console
    Admin,
}

impl DeviceRole {
    /// Every role, in control-flow order
    pub const ALL: [Self; 4] = [Self::Selector, Self::Capture, Self::Print, Self::Admin];

    /// Name announced on the hub unless configured otherwise
    #[must_use]
    pub const fn default_name(self) -> &'static str {
        match self {
            Self::Selector => "Selector",
            Self::Capture => "Capture",
            Self::Print => "Print",
            Self::Admin => "Admin",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_name())
    }
}

impl FromStr for DeviceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "selector" => Ok(Self::Selector),
            "capture" => Ok(Self::Capture),
            "print" | "printer" => Ok(Self::Print),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown device role: {other}")),
        }
    }
}

/// Identity a device registers with on connect
///
/// Assigned once; the room is always `"/" + lowercase(name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    role: DeviceRole,
    name: String,
    room: String,
}

impl DeviceIdentity {
    /// Build an identity for a role under the given hub name
    #[must_use]
    pub fn new(role: DeviceRole, name: impl Into<String>) -> Self {
        let name = name.into();
        let room = format!("/{}", name.to_lowercase());
        Self { role, name, room }
    }

    /// Identity using the role's default name
    #[must_use]
    pub fn for_role(role: DeviceRole) -> Self {
        Self::new(role, role.default_name())
    }

    #[must_use]
    pub const fn role(&self) -> DeviceRole {
        self.role
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Whether a remote-command target addresses this device
    #[must_use]
    pub fn is_addressed_by(&self, target: &str) -> bool {
        target == "all" || target == self.name
    }
}
