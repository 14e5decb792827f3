//! Booth stations
//!
//! Each station is a sans-IO state machine: it consumes decoded commands,
//! hub frames, timer firings and backend completions, and queues effects for
//! its runtime loop (see [`runtime`]) to carry out.

pub mod admin;
pub mod capture;
pub mod print;
pub mod runtime;
pub mod selector;

pub use admin::Admin;
pub use capture::Capture;
pub use print::Print;
pub use selector::Selector;

use crate::protocol::{Command, DecodeError, DeviceIdentity, HubFrame};
use crate::remote::{self, CommandTable};
use crate::timer::Scheduler;

/// A station that takes booth commands from chat
pub trait Station {
    fn identity(&self) -> &DeviceIdentity;

    fn on_command(&mut self, command: Command);

    fn on_session(&mut self, session: String);
}

impl<S: Scheduler<selector::SelectorTimer>> Station for Selector<S> {
    fn identity(&self) -> &DeviceIdentity {
        Self::identity(self)
    }

    fn on_command(&mut self, command: Command) {
        Self::on_command(self, command);
    }

    fn on_session(&mut self, session: String) {
        Self::on_session(self, session);
    }
}

impl<S: Scheduler<capture::CaptureTimer>> Station for Capture<S> {
    fn identity(&self) -> &DeviceIdentity {
        Self::identity(self)
    }

    fn on_command(&mut self, command: Command) {
        Self::on_command(self, command);
    }

    fn on_session(&mut self, session: String) {
        Self::on_session(self, session);
    }
}

impl<S: Scheduler<print::PrintTimer>> Station for Print<S> {
    fn identity(&self) -> &DeviceIdentity {
        Self::identity(self)
    }

    fn on_command(&mut self, command: Command) {
        Self::on_command(self, command);
    }

    fn on_session(&mut self, session: String) {
        Self::on_session(self, session);
    }
}

/// Feed one hub frame to a station
///
/// Chat lines are decoded as booth commands; free text is ignored. Remote
/// commands run against `table`, and the reply for Admin (named `reply_to`)
/// is returned for sending.
pub fn route_frame<D: Station>(
    device: &mut D,
    table: &CommandTable<D>,
    reply_to: &str,
    frame: HubFrame,
) -> Option<HubFrame> {
    match frame {
        HubFrame::Chat(chat) => {
            match Command::decode(&chat.msg) {
                Ok(command) => {
                    tracing::debug!(from = %chat.name, opcode = command.opcode(), "command received");
                    device.on_command(command);
                }
                Err(DecodeError::NotACommand) => {
                    tracing::trace!(from = %chat.name, "chat line");
                }
                Err(e) => tracing::warn!(from = %chat.name, msg = %chat.msg, error = %e, "bad command"),
            }
            None
        }
        HubFrame::Command(raw) => {
            let identity = device.identity().clone();
            remote::dispatch(&identity, reply_to, table, device, &raw).map(HubFrame::CommandResponse)
        }
        HubFrame::SessionId(session) => {
            device.on_session(session);
            None
        }
        HubFrame::UserJoined(presence) => {
            tracing::debug!(name = %presence.name, "station joined");
            None
        }
        HubFrame::UserLeft(presence) => {
            tracing::debug!(name = %presence.name, "station left");
            None
        }
        HubFrame::Ip(hint) => {
            tracing::info!(address = %hint.full, "hub address");
            None
        }
        HubFrame::Join(_) | HubFrame::CommandResponse(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrintConfig;
    use crate::devices::print::{PrintEffect, PrintTimer};
    use crate::protocol::{ChatMessage, DeviceRole};
    use crate::timer::ManualScheduler;

    fn printer() -> Print<ManualScheduler<PrintTimer>> {
        Print::new(
            DeviceIdentity::for_role(DeviceRole::Print),
            PrintConfig {
                require_purchase: false,
                ..PrintConfig::default()
            },
            ManualScheduler::new(),
        )
    }

    fn chat(msg: &str) -> HubFrame {
        HubFrame::Chat(ChatMessage {
            name: "Selector".to_string(),
            msg: msg.to_string(),
        })
    }

    #[test]
    fn chat_commands_reach_the_machine() {
        let mut p = printer();
        let table = print::commands();
        assert!(route_frame(&mut p, &table, "Admin", chat(":print-http://hub/a.png")).is_none());
        assert!(matches!(
            p.take_effects().as_slice(),
            [PrintEffect::Download { .. }]
        ));
    }

    #[test]
    fn free_text_and_malformed_commands_are_dropped() {
        let mut p = printer();
        let table = print::commands();
        route_frame(&mut p, &table, "Admin", chat("hello there"));
        route_frame(&mut p, &table, "Admin", chat(":print-"));
        assert!(p.take_effects().is_empty());
    }

    #[test]
    fn targeted_commands_are_answered() {
        let mut p = printer();
        let table = print::commands();
        let reply = route_frame(
            &mut p,
            &table,
            "Admin",
            HubFrame::Command("jobs -> Print".to_string()),
        );
        let Some(HubFrame::CommandResponse(reply)) = reply else {
            panic!("expected a reply");
        };
        assert_eq!(reply.to, "Admin");
        assert_eq!(reply.from, "Print");
        assert_eq!(reply.response, "no jobs");

        assert!(
            route_frame(
                &mut p,
                &table,
                "Admin",
                HubFrame::Command("jobs -> Capture".to_string())
            )
            .is_none()
        );
    }

    #[test]
    fn session_id_is_stored() {
        let mut p = printer();
        let table = print::commands();
        route_frame(&mut p, &table, "Admin", HubFrame::SessionId("abc".to_string()));
        let reply = route_frame(
            &mut p,
            &table,
            "Admin",
            HubFrame::Command("session -> Print".to_string()),
        );
        assert!(matches!(reply, Some(HubFrame::CommandResponse(r)) if r.response == "abc"));
    }
}
