//! Hub-side registry of connected devices
//!
//! Every websocket connection is tracked from accept to close. A connection
//! appears in the roster once it has sent `join`; Capture devices are also
//! issued a session id that lives as long as the connection.

pub mod registry;
pub mod types;

pub use registry::NodeRegistry;
pub use types::{ConnectionId, NodeSession};
