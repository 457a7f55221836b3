//! The first-chatter race and the commands built around it.

use {
    async_trait::async_trait,
    soulxbot_common::time::now_ms,
    soulxbot_store::{Session, StreamUser, User},
    tracing::{debug, info, warn},
};

use crate::context::{ChatCommand, CommandContext, CommandServices};

/// Leaderboard length of `firstleaders`.
pub const LEADERBOARD_SIZE: u32 = 3;

/// Seconds the winner is timed out for boasting with `!first`.
pub const BOAST_TIMEOUT_SECS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceOutcome {
    /// No live session, the feature is off, or a winner is already known.
    Closed,
    /// The sender may not win in this channel.
    Ineligible,
    Won,
    /// Another message won the conditional write first.
    Lost { winner_id: Option<i64> },
}

/// Awards "first" to exactly one chatter per session.
pub struct FirstRace {
    services: CommandServices,
}

impl FirstRace {
    pub fn new(services: CommandServices) -> Self {
        Self { services }
    }

    /// Evaluate one message from `sender` against the channel's session.
    pub async fn evaluate(
        &self,
        channel: &str,
        sender: &User,
        owner: &StreamUser,
        session: Option<&Session>,
    ) -> anyhow::Result<RaceOutcome> {
        let Some(session) = session.filter(|s| s.is_live()) else {
            return Ok(RaceOutcome::Closed);
        };
        if !owner.first_enabled() || session.first_user_id.is_some() {
            return Ok(RaceOutcome::Closed);
        }
        if sender.id == owner.id()
            || self
                .services
                .store
                .is_excluded(owner.id(), &sender.username)
                .await?
        {
            return Ok(RaceOutcome::Ineligible);
        }

        if !self.services.store.claim_first(session.id, sender.id).await? {
            let winner_id = self
                .services
                .store
                .find_session(session.id)
                .await?
                .and_then(|s| s.first_user_id);
            debug!(session_id = session.id, user = %sender.username, ?winner_id, "lost the first race");
            return Ok(RaceOutcome::Lost { winner_id });
        }

        info!(channel, session_id = session.id, user = %sender.username, "first chatter");
        self.services
            .say(
                channel,
                &format!("Congratulations {}! You're first!", sender.display_name),
            )
            .await?;
        Ok(RaceOutcome::Won)
    }
}

/// `first`, `firstcount[-all]` and `firstleaders[-all]`.
pub struct FirstCommands {
    services: CommandServices,
}

impl FirstCommands {
    pub fn new(services: CommandServices) -> Self {
        Self { services }
    }

    async fn first(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        let Some(winner_id) = ctx.live_session().and_then(|s| s.first_user_id) else {
            return Ok(());
        };

        if winner_id != ctx.invoker.id {
            let winner = self.services.store.find_user(winner_id).await?;
            let name = winner.map_or_else(|| "someone else".to_string(), |u| u.display_name);
            return self
                .services
                .say(
                    &ctx.channel,
                    &format!(
                        "Sorry {}, you are not first. {name} was!",
                        ctx.invoker.display_name
                    ),
                )
                .await;
        }

        self.services
            .say(
                &ctx.channel,
                &format!("Yes {}! We KNOW. You were first...", ctx.invoker.display_name),
            )
            .await?;
        if let Err(e) = self.timeout_winner(ctx).await {
            warn!(channel = %ctx.channel, user = %ctx.invoker.username, error = %e, "could not time out first chatter");
        }
        Ok(())
    }

    async fn timeout_winner(&self, ctx: &CommandContext) -> soulxbot_common::Result<()> {
        let token = self.services.custodian.access_token(ctx.owner.id()).await?;
        self.services
            .api
            .timeout_user(
                &token,
                &ctx.owner.id().to_string(),
                &ctx.invoker.id.to_string(),
                BOAST_TIMEOUT_SECS,
                "We KNOW you were first",
            )
            .await
    }

    async fn count(&self, ctx: &CommandContext, all_time: bool) -> anyhow::Result<()> {
        let since = if all_time {
            0
        } else {
            ctx.owner.config.first_epoch
        };
        let times = self
            .services
            .store
            .times_first(ctx.owner.id(), ctx.invoker.id, since)
            .await?;
        self.services
            .say(
                &ctx.channel,
                &format!("{}, you have been first {times} times", ctx.invoker.display_name),
            )
            .await
    }

    async fn leaders(&self, ctx: &CommandContext, all_time: bool) -> anyhow::Result<()> {
        let since = if all_time {
            0
        } else {
            ctx.owner.config.first_epoch
        };
        let leaders = self
            .services
            .store
            .first_leaders(ctx.owner.id(), since, LEADERBOARD_SIZE)
            .await?;
        for (i, leader) in leaders.iter().enumerate() {
            self.services
                .say(
                    &ctx.channel,
                    &format!(
                        "{}. {} - {}",
                        i + 1,
                        leader.user.display_name,
                        leader.times_first
                    ),
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChatCommand for FirstCommands {
    async fn run(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        if !ctx.owner.first_enabled() {
            return Ok(());
        }
        match ctx.command.as_str() {
            "first" => self.first(ctx).await,
            "firstcount" => self.count(ctx, false).await,
            "firstcount-all" => self.count(ctx, true).await,
            "firstleaders" => self.leaders(ctx, false).await,
            "firstleaders-all" => self.leaders(ctx, true).await,
            other => anyhow::bail!("not a first command: {other}"),
        }
    }
}

/// `firstleaders-reset`: the owner starts a new leaderboard period.
pub struct FirstLeadersReset {
    services: CommandServices,
}

impl FirstLeadersReset {
    pub fn new(services: CommandServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ChatCommand for FirstLeadersReset {
    async fn run(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        if !ctx.is_owner() {
            return Ok(());
        }
        self.services
            .store
            .reset_first_epoch(ctx.owner.id(), now_ms())
            .await?;
        info!(channel = %ctx.channel, "first leaderboard reset");
        self.services.say(&ctx.channel, "First leaders reset").await
    }
}

/// `firstgive <user>`: the owner names the first chatter of the live
/// session.
pub struct FirstGive {
    services: CommandServices,
}

impl FirstGive {
    pub fn new(services: CommandServices) -> Self {
        Self { services }
    }

    /// Local user by login, falling back to a platform lookup that also
    /// records the user.
    async fn resolve(&self, login: &str) -> anyhow::Result<Option<User>> {
        if let Some(user) = self.services.store.find_user_by_username(login).await? {
            return Ok(Some(user));
        }
        let found = self.services.api.get_users(&[login.to_string()]).await?;
        let Some(remote) = found.into_iter().find(|u| u.login.eq_ignore_ascii_case(login)) else {
            return Ok(None);
        };
        let Some(id) = remote.numeric_id() else {
            return Ok(None);
        };
        let user = self
            .services
            .store
            .upsert_user(id, &remote.login, &remote.display_name)
            .await?;
        Ok(Some(user))
    }
}

#[async_trait]
impl ChatCommand for FirstGive {
    async fn run(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        let login = target_login(&ctx.input);
        let Some(session) = ctx.live_session() else {
            return Ok(());
        };
        if !ctx.is_owner() || login.is_empty() || !ctx.owner.first_enabled() {
            return Ok(());
        }

        let Some(target) = self.resolve(&login).await? else {
            return self
                .services
                .say(&ctx.channel, "That user does not exist")
                .await;
        };
        if !self.services.store.give_first(session.id, target.id).await? {
            debug!(session_id = session.id, "session closed before firstgive");
            return Ok(());
        }
        info!(channel = %ctx.channel, session_id = session.id, user = %target.username, "first given");
        self.services
            .say(
                &ctx.channel,
                &format!("{} has been set as first for this stream!", target.username),
            )
            .await
    }
}

/// `firstexclude <user>`: the owner bars a user from winning in their
/// channel.
pub struct FirstExclude {
    services: CommandServices,
}

impl FirstExclude {
    pub fn new(services: CommandServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ChatCommand for FirstExclude {
    async fn run(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        let login = target_login(&ctx.input);
        if !ctx.is_owner() || login.is_empty() {
            return Ok(());
        }
        let added = self
            .services
            .store
            .add_exclusion(Some(ctx.owner.id()), &login)
            .await?;
        let text = if added {
            format!("{login} can no longer be first in this channel")
        } else {
            format!("{login} is already excluded from first")
        };
        self.services.say(&ctx.channel, &text).await
    }
}

/// First word of `input`, lowercased, without a leading `@`.
fn target_login(input: &str) -> String {
    input
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_start_matches('@')
        .to_lowercase()
}
