//! Chat transport.
//!
//! [`ChatOutbound`] is the seam the command layer talks through;
//! [`TwitchChat`] implements it over Twitch's IRC-on-WebSocket endpoint and
//! delivers inbound [`ChatMessage`]s on a channel.

pub mod irc;
pub mod outbound;
pub mod twitch_irc;

#[cfg(any(test, feature = "testing"))]
pub use outbound::testing;
pub use {
    outbound::{ChatMessage, ChatOutbound, normalize_channel},
    twitch_irc::{TwitchChat, TwitchChatConfig},
};
