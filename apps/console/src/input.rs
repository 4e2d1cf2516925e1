//! # Console Input
//!
//! One line of stdin per command:
//!
//! ```text
//! relay <id> on|off     toggle one relay          GET /check
//! auto on|off           auto-watering policy      GET /auto-watering
//! manual on|off         all pumps by hand         GET /manual-watering
//! status                print slots and link state
//! help
//! quit
//! ```

use microbox_core::{parse_desired_state, CommandRequest, ResourceKind};

use crate::error::{ConsoleError, ConsoleResult};

pub const HELP: &str = "\
commands:
  relay <id> on|off   toggle one relay
  auto on|off         enable or disable auto watering
  manual on|off       run or stop every pump
  status              show dashboard slots and link state
  help                this text
  quit                stop and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Send(CommandRequest),
    Status,
    Help,
    Quit,
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> ConsoleResult<Option<ConsoleCommand>> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match verb.to_lowercase().as_str() {
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => ConsoleCommand::Send(parse_request(other, args)?),
    };
    Ok(Some(command))
}

fn parse_request(verb: &str, args: &[&str]) -> ConsoleResult<CommandRequest> {
    let kind: ResourceKind = verb
        .parse()
        .map_err(|_| ConsoleError::UnknownCommand(verb.to_string()))?;

    match (kind, args) {
        (ResourceKind::Relay, [id, state]) => {
            Ok(CommandRequest::relay(*id, parse_desired_state(state)?)?)
        }
        (ResourceKind::Relay, _) => Err(ConsoleError::Usage("relay <id> on|off")),
        (ResourceKind::AutoWateringPolicy, [state]) => {
            Ok(CommandRequest::auto_watering(parse_desired_state(state)?))
        }
        (ResourceKind::AutoWateringPolicy, _) => Err(ConsoleError::Usage("auto on|off")),
        (ResourceKind::ManualWatering, [state]) => {
            Ok(CommandRequest::manual_watering(parse_desired_state(state)?))
        }
        (ResourceKind::ManualWatering, _) => Err(ConsoleError::Usage("manual on|off")),
    }
}
