//! Wire protocol shared by every booth device
//!
//! Commands travel as the `msg` string of a `chat message` frame on the relay
//! hub. [`Command`] is the closed set of opcodes; [`HubFrame`] is the JSON
//! envelope around every hub event.

pub mod command;
pub mod filter;
pub mod frame;
pub mod identity;

pub use command::{Command, DecodeError, SENTINEL};
pub use filter::{FilterName, FilterSpec};
pub use frame::{ChatMessage, CommandResponse, HubFrame, IpHint, Join, Presence, RosterEntry};
pub use identity::{DeviceIdentity, DeviceRole};
