//! Console commands.
//!
//! Free-text input maps to one of:
//! - a [`ServerCommand`] (`STOP`, `RESET`, ...)
//! - `PUSH <init|order|report> <path>`
//! - `QUIT`
//!
//! Anything else is [`ConsoleInput::Unrecognized`] and the caller reprints
//! the command list.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ClientError, Result};

const PUSH_USAGE: &str = "Expected PUSH init|order|report <path to xml>";

/// Server commands accepted by the remote session control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerCommand {
    Stop,
    Reset,
    Initialize,
    Share,
    Start,
    Pause,
    Status,
    QueryInit,
}

impl ServerCommand {
    /// All commands, in listing order.
    pub const ALL: [ServerCommand; 8] = [
        ServerCommand::Stop,
        ServerCommand::Reset,
        ServerCommand::Initialize,
        ServerCommand::Share,
        ServerCommand::Start,
        ServerCommand::Pause,
        ServerCommand::Status,
        ServerCommand::QueryInit,
    ];

    /// Wire name of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerCommand::Stop => "STOP",
            ServerCommand::Reset => "RESET",
            ServerCommand::Initialize => "INITIALIZE",
            ServerCommand::Share => "SHARE",
            ServerCommand::Start => "START",
            ServerCommand::Pause => "PAUSE",
            ServerCommand::Status => "STATUS",
            ServerCommand::QueryInit => "QUERYINIT",
        }
    }
}

impl fmt::Display for ServerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerCommand {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ClientError::Usage(format!("Unknown server command: {}", s)))
    }
}

/// Message kind for `PUSH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Initialization,
    Order,
    Report,
}

impl FromStr for PushKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "init" | "initialization" => Ok(PushKind::Initialization),
            "order" => Ok(PushKind::Order),
            "report" => Ok(PushKind::Report),
            _ => Err(ClientError::Usage(
                "Message type should be Init, Order or Report".to_string(),
            )),
        }
    }
}

/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Server(ServerCommand),
    Push { kind: PushKind, path: PathBuf },
    Quit,
    /// Blank line.
    Empty,
    Unrecognized(String),
}

/// Parse a console line.
///
/// Never fails for unknown input; only a malformed `PUSH` is an error.
pub fn parse_input(line: &str) -> Result<ConsoleInput> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(ConsoleInput::Empty);
    }
    if trimmed.eq_ignore_ascii_case("quit") {
        return Ok(ConsoleInput::Quit);
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    if tokens[0].eq_ignore_ascii_case("push") {
        if tokens.len() != 3 {
            return Err(ClientError::Usage(PUSH_USAGE.to_string()));
        }
        let kind = tokens[1].parse()?;
        return Ok(ConsoleInput::Push {
            kind,
            path: PathBuf::from(tokens[2]),
        });
    }

    match trimmed.parse() {
        Ok(cmd) => Ok(ConsoleInput::Server(cmd)),
        Err(_) => Ok(ConsoleInput::Unrecognized(trimmed.to_string())),
    }
}

/// The command listing shown at startup and after unrecognized input.
pub fn command_list() -> String {
    let names: Vec<&str> = ServerCommand::ALL.iter().map(|c| c.as_str()).collect();
    format!("Commands: {}, PUSH init|order|report <path to xml>, QUIT", names.join(", "))
}
