//! Interactive console session.
//!
//! - `command`: server commands and console input parsing
//! - `display`: the display gate shared by the command and receive loops
//! - `driver`: the command loop over a [`SessionControl`] collaborator

mod command;
mod display;
mod driver;

pub use command::{command_list, parse_input, ConsoleInput, PushKind, ServerCommand};
pub use display::DisplayGate;
pub use driver::{display_handlers, BoxFuture, SessionControl, SessionDriver};
