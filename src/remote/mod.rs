//! Admin remote command dispatch
//!
//! Admin sends `command` frames holding `expr` or `expr -> target`. Devices
//! never evaluate code: each exposes a [`CommandTable`] of named handlers over
//! its own context, and the expression only selects a handler and its
//! arguments.

pub mod expr;
pub mod table;

pub use expr::{Call, RemoteCommand};
pub use table::{CommandTable, Handler, no_args};

use thiserror::Error;

use crate::protocol::{CommandResponse, DeviceIdentity};

/// Remote command failure, returned to Admin as `Error: <msg>`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("cannot parse command: {0}")]
    Parse(String),

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("bad arguments: {0}")]
    Arguments(String),

    #[error("{0}")]
    Failed(String),
}

/// Run a received `command` frame against a device
///
/// Returns the reply to send back, which only exists for targeted commands
/// addressed to this device. Broadcast results are logged and dropped.
pub fn dispatch<D>(
    identity: &DeviceIdentity,
    reply_to: &str,
    table: &CommandTable<D>,
    device: &mut D,
    raw: &str,
) -> Option<CommandResponse> {
    let command = RemoteCommand::parse(raw);
    if let Some(target) = command.target() {
        if !identity.is_addressed_by(target) {
            tracing::trace!(target, "command for another device");
            return None;
        }
    }

    let outcome = table.eval(device, command.expr());
    match &outcome {
        Ok(result) => tracing::info!(expr = command.expr(), %result, "remote command evaluated"),
        Err(e) => tracing::warn!(expr = command.expr(), error = %e, "remote command failed"),
    }

    command.target()?;
    let response = outcome.unwrap_or_else(|e| format!("Error: {e}"));
    Some(CommandResponse {
        to: reply_to.to_string(),
        from: identity.name().to_string(),
        response,
    })
}
