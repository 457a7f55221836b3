//! Question of the day.

use {
    async_trait::async_trait,
    soulxbot_store::{Question, Session},
    tracing::{debug, info},
};

use crate::context::{ChatCommand, CommandContext, CommandServices};

/// Reply when every question has been used up in a channel.
pub const NO_QUESTION_REPLY: &str = "Go ask ChatGPT for your question!";

pub const SKIPPED_REPLY: &str = "Question of the day skipped, enter !qotd to get a new question";

/// `qotd` and `skipqotd`.
pub struct QuestionCommands {
    services: CommandServices,
}

impl QuestionCommands {
    pub fn new(services: CommandServices) -> Self {
        Self { services }
    }

    /// The question pinned to `session`, pinning a fresh one if needed.
    async fn question_of_the_day(&self, session: &Session) -> anyhow::Result<Option<Question>> {
        let store = &self.services.store;
        if let Some(id) = session.qotd_id
            && let Some(question) = store.find_question(id).await?
        {
            return Ok(Some(question));
        }

        let Some(candidate) = store.random_question(session.user_id).await? else {
            return Ok(None);
        };
        if store.pin_question(session.id, candidate.id).await? {
            info!(session_id = session.id, question_id = candidate.id, "question of the day pinned");
            return Ok(Some(candidate));
        }

        // Someone else pinned a question since the session was read.
        let pinned = match store.find_session(session.id).await?.and_then(|s| s.qotd_id) {
            Some(id) => store.find_question(id).await?,
            None => None,
        };
        Ok(pinned.or(Some(candidate)))
    }

    async fn qotd(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        let Some(session) = ctx.live_session() else {
            return Ok(());
        };
        if !ctx.owner.qotd_enabled() {
            return Ok(());
        }
        let text = match self.question_of_the_day(session).await? {
            Some(question) => question.text,
            None => NO_QUESTION_REPLY.to_string(),
        };
        self.services.say(&ctx.channel, &text).await
    }

    async fn skip(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        let Some(session) = ctx.live_session() else {
            return Ok(());
        };
        let Some(question_id) = session.qotd_id else {
            return Ok(());
        };
        if !ctx.is_owner() || !ctx.owner.qotd_enabled() {
            return Ok(());
        }

        let question = self.services.store.skip_question(question_id).await?;
        self.services
            .store
            .unpin_question(session.id, question_id)
            .await?;
        debug!(
            session_id = session.id,
            question_id,
            skip_count = question.skip_count,
            disabled = question.disabled,
            "question skipped"
        );
        self.services.say(&ctx.channel, SKIPPED_REPLY).await
    }
}

#[async_trait]
impl ChatCommand for QuestionCommands {
    async fn run(&self, ctx: &CommandContext) -> anyhow::Result<()> {
        match ctx.command.as_str() {
            "qotd" => self.qotd(ctx).await,
            "skipqotd" => self.skip(ctx).await,
            other => anyhow::bail!("not a question command: {other}"),
        }
    }
}
