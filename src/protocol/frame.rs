//! Relay hub wire frames
//!
//! Every websocket text frame is `{"event": <name>, "data": <payload>}`. The
//! event and field names are fixed by the deployed devices and must not change.

use serde::{Deserialize, Serialize};

use super::command::Command;
use super::identity::DeviceIdentity;

/// Registration sent on every (re)connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub name: String,
    /// Room, `"/" + lowercase(name)`
    pub folder: String,
}

impl From<&DeviceIdentity> for Join {
    fn from(identity: &DeviceIdentity) -> Self {
        Self {
            name: identity.name().to_string(),
            folder: identity.room().to_string(),
        }
    }
}

/// Broadcast chat line; commands ride in `msg`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub name: String,
    pub msg: String,
}

/// Reply to a targeted remote command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub to: String,
    pub from: String,
    pub response: String,
}

/// One connected device as seen by the hub
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    pub folder: String,
}

/// Payload of `user joined` / `user left`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub name: String,
    #[serde(default)]
    pub users: Vec<RosterEntry>,
}

/// Network address hint for operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpHint {
    pub full: String,
}

/// One hub event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum HubFrame {
    #[serde(rename = "join")]
    Join(Join),
    #[serde(rename = "chat message")]
    Chat(ChatMessage),
    /// Remote command text (`expr` or `expr -> target`)
    #[serde(rename = "command")]
    Command(String),
    #[serde(rename = "command response")]
    CommandResponse(CommandResponse),
    /// Capture session identifier issued by the hub
    #[serde(rename = "session-id")]
    SessionId(String),
    #[serde(rename = "user joined")]
    UserJoined(Presence),
    #[serde(rename = "user left")]
    UserLeft(Presence),
    #[serde(rename = "ip")]
    Ip(IpHint),
}

impl HubFrame {
    /// Chat frame carrying an encoded command
    #[must_use]
    pub fn command_message(from: &str, command: &Command) -> Self {
        Self::Chat(ChatMessage {
            name: from.to_string(),
            msg: command.encode(),
        })
    }

    /// Event name as it appears on the wire
    #[must_use]
    pub const fn event(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::Chat(_) => "chat message",
            Self::Command(_) => "command",
            Self::CommandResponse(_) => "command response",
            Self::SessionId(_) => "session-id",
            Self::UserJoined(_) => "user joined",
            Self::UserLeft(_) => "user left",
            Self::Ip(_) => "ip",
        }
    }

    /// Serialize to a websocket text payload
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_text(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a websocket text payload
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a known hub event
    pub fn from_text(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DeviceRole;

    #[test]
    fn chat_message_wire_shape() {
        let frame = HubFrame::command_message("Selector", &Command::Start);
        let value: serde_json::Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"event": "chat message", "data": {"name": "Selector", "msg": ":start"}})
        );
    }

    #[test]
    fn join_uses_room_as_folder() {
        let id = DeviceIdentity::for_role(DeviceRole::Capture);
        let frame = HubFrame::Join(Join::from(&id));
        assert_eq!(
            frame.to_text().unwrap(),
            r#"{"event":"join","data":{"name":"Capture","folder":"/capture"}}"#
        );
    }

    #[test]
    fn parses_every_event_name() {
        let cases = [
            r#"{"event":"command","data":"status() -> Print"}"#,
            r#"{"event":"command response","data":{"to":"Admin","from":"Print","response":"ok"}}"#,
            r#"{"event":"session-id","data":"abc"}"#,
            r#"{"event":"user joined","data":{"name":"Print","users":[{"name":"Print","folder":"/print"}]}}"#,
            r#"{"event":"user left","data":{"name":"Print"}}"#,
            r#"{"event":"ip","data":{"full":"10.0.0.4:3000"}}"#,
        ];
        for text in cases {
            let frame = HubFrame::from_text(text).unwrap();
            let back: serde_json::Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
            assert_eq!(back["event"], frame.event());
        }
    }

    #[test]
    fn unknown_event_is_an_error() {
        assert!(HubFrame::from_text(r#"{"event":"typing","data":{}}"#).is_err());
    }
}
