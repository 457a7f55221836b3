//! Chat command core: the first-chatter race, the command registry and the
//! commands themselves.
//!
//! Each inbound message flows through [`ChatBot::handle_message`]: the
//! sender is recorded, the first race is evaluated against the channel's
//! live session, then the message is dispatched if it is a command.

pub mod bot;
pub mod context;
pub mod first;
pub mod question;
pub mod registry;

pub use {
    bot::ChatBot,
    context::{ChatCommand, CommandContext, CommandServices},
    first::{FirstRace, RaceOutcome},
    registry::{CommandRegistry, parse_command},
};
