use std::sync::Arc;

use {
    async_trait::async_trait,
    soulxbot_channels::ChatOutbound,
    soulxbot_store::{Session, Store, StreamUser, User},
    soulxbot_twitch::{CredentialCustodian, PlatformApi},
};

/// Everything a chat command may call into.
#[derive(Clone)]
pub struct CommandServices {
    pub store: Store,
    pub outbound: Arc<dyn ChatOutbound>,
    pub api: Arc<dyn PlatformApi>,
    pub custodian: Arc<CredentialCustodian>,
}

impl CommandServices {
    pub async fn say(&self, channel: &str, text: &str) -> anyhow::Result<()> {
        self.outbound.say(channel, text).await
    }
}

/// Context passed to every command handler.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Channel login the message was posted in.
    pub channel: String,
    /// Sender of the message.
    pub invoker: User,
    /// Broadcaster who owns the channel.
    pub owner: StreamUser,
    /// Live session of the channel, as read when the message arrived.
    pub session: Option<Session>,
    /// Canonical command name, without the `-dev` suffix.
    pub command: String,
    /// Trimmed rest of the message after the command word.
    pub input: String,
}

impl CommandContext {
    pub fn is_owner(&self) -> bool {
        self.invoker.id == self.owner.id()
    }

    /// The session, if it is still live.
    pub fn live_session(&self) -> Option<&Session> {
        self.session.as_ref().filter(|s| s.is_live())
    }
}

/// A chat command handler.
///
/// One handler may serve several command names; it can tell them apart via
/// [`CommandContext::command`]. Failures are logged by the registry.
#[async_trait]
pub trait ChatCommand: Send + Sync {
    async fn run(&self, ctx: &CommandContext) -> anyhow::Result<()>;
}
