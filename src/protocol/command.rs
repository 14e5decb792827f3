//! Command Codec
//!
//! Every cross-device signal is a `:`-prefixed opcode carried in the `msg`
//! field of a chat message. Arguments follow the opcode after a `-`. Link
//! arguments are taken verbatim as everything after the opcode prefix, so
//! links containing dashes survive intact.

use std::fmt;
use std::num::NonZeroU32;

use thiserror::Error;

use super::filter::FilterSpec;

/// Prefix distinguishing commands from free chat
pub const SENTINEL: char = ':';

const START: &str = ":start";
const END: &str = ":end";
const READY: &str = ":ready";
const STOP: &str = ":stop";
const CAPTURE: &str = ":capture";
const CAMERA_READY: &str = ":camera-ready";
const COUNTDOWN: &str = ":countdown-";
const COUNTDOWN_SUFFIX: &str = "-capture";
const FILTER: &str = ":filter-";
const ANIMATION_STARTED: &str = ":animation-started-";
const LOCAL_LINK: &str = ":local-link-";
const ARCHIVE_LINK: &str = ":google-drive-link-";
const PURCHASE_CONFIRMED: &str = ":purchase-confirmed-";
const PRINT: &str = ":print-";
const FRAME: &str = ":frame-";

/// Reasons a message is not a recognized command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Free text without the `:` sentinel
    #[error("not a command")]
    NotACommand,

    /// Sentinel present but no known opcode matches
    #[error("unknown opcode: {0}")]
    UnknownOpcode(String),

    /// Opcode recognized but its argument is empty
    #[error("{opcode} is missing its argument")]
    MissingArgument { opcode: &'static str },

    /// A numeric argument did not parse as a positive integer
    #[error("{opcode} has invalid number '{value}'")]
    InvalidNumber { opcode: &'static str, value: String },

    /// The filter payload is not a valid filter object
    #[error("malformed filter payload: {0}")]
    MalformedFilter(String),
}

/// One opcode of the booth protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Remove the capture blur (`:start`)
    Start,
    /// Re-apply the capture blur (`:end`)
    End,
    /// Acquire the camera (`:ready`)
    Ready,
    /// Release the camera (`:stop`)
    Stop,
    /// Take one shot now (`:capture`)
    Capture,
    /// Count down locally then capture (`:countdown-<N>-capture`)
    Countdown { seconds: NonZeroU32 },
    /// Replace the active filter (`:filter-<json>`)
    Filter(FilterSpec),
    /// Camera idle and able to take the next shot (`:camera-ready`)
    CameraReady,
    /// Asset uploaded, reveal animation may start (`:animation-started-<link>`)
    AnimationStarted { link: String },
    /// Direct link for immediate display (`:local-link-<link>`)
    LocalLink { link: String },
    /// Archival link available (`:google-drive-link-<link>`)
    ArchiveLink { link: String },
    /// Guest completed the purchase gate (`:purchase-confirmed-<link>`)
    PurchaseConfirmed { link: String },
    /// Print the asset at link (`:print-<link>`)
    Print { link: String },
    /// Frame chosen with its required shot count (`:frame-<id>-<count>`)
    Frame { id: String, shots: NonZeroU32 },
}

impl Command {
    /// Decode a chat message into a command
    ///
    /// Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the text is free chat, names an unknown
    /// opcode, or carries an argument that does not parse. Callers are
    /// expected to log and ignore the message.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let msg = raw.trim();
        if !msg.starts_with(SENTINEL) {
            return Err(DecodeError::NotACommand);
        }

        match msg {
            START => return Ok(Self::Start),
            END => return Ok(Self::End),
            READY => return Ok(Self::Ready),
            STOP => return Ok(Self::Stop),
            CAPTURE => return Ok(Self::Capture),
            CAMERA_READY => return Ok(Self::CameraReady),
            _ => {}
        }

        // Longer prefixes first so no opcode shadows another
        if let Some(rest) = msg.strip_prefix(ANIMATION_STARTED) {
            return link_arg(ANIMATION_STARTED, rest).map(|link| Self::AnimationStarted { link });
        }
        if let Some(rest) = msg.strip_prefix(ARCHIVE_LINK) {
            return link_arg(ARCHIVE_LINK, rest).map(|link| Self::ArchiveLink { link });
        }
        if let Some(rest) = msg.strip_prefix(PURCHASE_CONFIRMED) {
            return link_arg(PURCHASE_CONFIRMED, rest).map(|link| Self::PurchaseConfirmed { link });
        }
        if let Some(rest) = msg.strip_prefix(LOCAL_LINK) {
            return link_arg(LOCAL_LINK, rest).map(|link| Self::LocalLink { link });
        }
        if let Some(rest) = msg.strip_prefix(COUNTDOWN) {
            let Some(seconds) = rest.strip_suffix(COUNTDOWN_SUFFIX) else {
                return Err(DecodeError::UnknownOpcode(msg.to_string()));
            };
            return positive(COUNTDOWN, seconds).map(|seconds| Self::Countdown { seconds });
        }
        if let Some(rest) = msg.strip_prefix(FILTER) {
            if rest.trim().is_empty() {
                return Err(DecodeError::MissingArgument { opcode: FILTER });
            }
            return FilterSpec::from_json(rest)
                .map(Self::Filter)
                .map_err(|e| DecodeError::MalformedFilter(e.to_string()));
        }
        if let Some(rest) = msg.strip_prefix(PRINT) {
            return link_arg(PRINT, rest).map(|link| Self::Print { link });
        }
        if let Some(rest) = msg.strip_prefix(FRAME) {
            let Some((id, count)) = rest.rsplit_once('-') else {
                return Err(DecodeError::MissingArgument { opcode: FRAME });
            };
            if id.is_empty() {
                return Err(DecodeError::MissingArgument { opcode: FRAME });
            }
            let shots = positive(FRAME, count)?;
            return Ok(Self::Frame {
                id: id.to_string(),
                shots,
            });
        }

        Err(DecodeError::UnknownOpcode(msg.to_string()))
    }

    /// Encode into the chat message text
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Short opcode name for logs
    #[must_use]
    pub const fn opcode(&self) -> &'static str {
        match self {
            Self::Start => START,
            Self::End => END,
            Self::Ready => READY,
            Self::Stop => STOP,
            Self::Capture => CAPTURE,
            Self::Countdown { .. } => COUNTDOWN,
            Self::Filter(_) => FILTER,
            Self::CameraReady => CAMERA_READY,
            Self::AnimationStarted { .. } => ANIMATION_STARTED,
            Self::LocalLink { .. } => LOCAL_LINK,
            Self::ArchiveLink { .. } => ARCHIVE_LINK,
            Self::PurchaseConfirmed { .. } => PURCHASE_CONFIRMED,
            Self::Print { .. } => PRINT,
            Self::Frame { .. } => FRAME,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start
            | Self::End
            | Self::Ready
            | Self::Stop
            | Self::Capture
            | Self::CameraReady => f.write_str(self.opcode()),
            Self::Countdown { seconds } => write!(f, "{COUNTDOWN}{seconds}{COUNTDOWN_SUFFIX}"),
            Self::Filter(spec) => write!(f, "{FILTER}{}", spec.to_json()),
            Self::AnimationStarted { link }
            | Self::LocalLink { link }
            | Self::ArchiveLink { link }
            | Self::PurchaseConfirmed { link }
            | Self::Print { link } => write!(f, "{}{link}", self.opcode()),
            Self::Frame { id, shots } => write!(f, "{FRAME}{id}-{shots}"),
        }
    }
}

fn link_arg(opcode: &'static str, rest: &str) -> Result<String, DecodeError> {
    let link = rest.trim();
    if link.is_empty() {
        Err(DecodeError::MissingArgument { opcode })
    } else {
        Ok(link.to_string())
    }
}

fn positive(opcode: &'static str, raw: &str) -> Result<NonZeroU32, DecodeError> {
    raw.trim()
        .parse::<NonZeroU32>()
        .map_err(|_| DecodeError::InvalidNumber {
            opcode,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::filter::FilterName;

    fn n(v: u32) -> NonZeroU32 {
        NonZeroU32::new(v).unwrap()
    }

    fn every_variant() -> Vec<Command> {
        vec![
            Command::Start,
            Command::End,
            Command::Ready,
            Command::Stop,
            Command::Capture,
            Command::Countdown { seconds: n(5) },
            Command::Filter(
                FilterSpec::none()
                    .with(FilterName::Sepia, "0.3")
                    .with(FilterName::HueRotate, "15deg"),
            ),
            Command::CameraReady,
            Command::AnimationStarted {
                link: "http://hub/images/a-b-c.png".to_string(),
            },
            Command::LocalLink {
                link: "http://hub/images/x.png".to_string(),
            },
            Command::ArchiveLink {
                link: "https://lh3.googleusercontent.com/d/1a-2b-3c".to_string(),
            },
            Command::PurchaseConfirmed {
                link: "https://drive/x-y".to_string(),
            },
            Command::Print {
                link: "https://drive/x-y".to_string(),
            },
            Command::Frame {
                id: "frame-classic".to_string(),
                shots: n(3),
            },
        ]
    }

    #[test]
    fn every_opcode_round_trips() {
        for cmd in every_variant() {
            let text = cmd.encode();
            assert_eq!(Command::decode(&text), Ok(cmd.clone()), "round trip of {text}");
        }
    }

    #[test]
    fn exact_opcodes_do_not_match_prefixes() {
        assert!(matches!(
            Command::decode(":started"),
            Err(DecodeError::UnknownOpcode(_))
        ));
        assert!(matches!(
            Command::decode(":capture-now"),
            Err(DecodeError::UnknownOpcode(_))
        ));
        assert_eq!(Command::decode("  :camera-ready \n"), Ok(Command::CameraReady));
    }

    #[test]
    fn links_keep_their_dashes() {
        let cmd = Command::decode(":google-drive-link-https://x.test/a-b--c-").unwrap();
        assert_eq!(
            cmd,
            Command::ArchiveLink {
                link: "https://x.test/a-b--c-".to_string()
            }
        );
    }

    #[test]
    fn countdown_number_is_defensive() {
        assert_eq!(
            Command::decode(":countdown-5-capture"),
            Ok(Command::Countdown { seconds: n(5) })
        );
        assert!(matches!(
            Command::decode(":countdown-five-capture"),
            Err(DecodeError::InvalidNumber { .. })
        ));
        assert!(matches!(
            Command::decode(":countdown-0-capture"),
            Err(DecodeError::InvalidNumber { .. })
        ));
        assert!(matches!(
            Command::decode(":countdown--capture"),
            Err(DecodeError::InvalidNumber { .. })
        ));
        assert!(matches!(
            Command::decode(":countdown-5"),
            Err(DecodeError::UnknownOpcode(_))
        ));
    }

    #[test]
    fn frame_with_non_numeric_count_is_rejected() {
        assert!(matches!(
            Command::decode(":frame-classic-three"),
            Err(DecodeError::InvalidNumber { .. })
        ));
        assert!(matches!(
            Command::decode(":frame-classic"),
            Err(DecodeError::InvalidNumber { .. })
        ));
        assert!(matches!(
            Command::decode(":frame--3"),
            Err(DecodeError::MissingArgument { .. })
        ));
    }

    #[test]
    fn frame_id_may_contain_dashes() {
        assert_eq!(
            Command::decode(":frame-strip-4x1-4"),
            Ok(Command::Frame {
                id: "strip-4x1".to_string(),
                shots: n(4)
            })
        );
    }

    #[test]
    fn malformed_filter_is_an_error_not_a_panic() {
        assert!(matches!(
            Command::decode(":filter-{\"sepia\":"),
            Err(DecodeError::MalformedFilter(_))
        ));
        assert!(matches!(
            Command::decode(":filter-"),
            Err(DecodeError::MissingArgument { .. })
        ));
    }

    #[test]
    fn empty_links_are_rejected() {
        assert!(matches!(
            Command::decode(":print-   "),
            Err(DecodeError::MissingArgument { .. })
        ));
    }

    #[test]
    fn free_text_is_not_a_command() {
        assert_eq!(
            Command::decode("Test message sent from Admin"),
            Err(DecodeError::NotACommand)
        );
    }
}
