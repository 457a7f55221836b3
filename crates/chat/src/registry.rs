use std::{collections::HashMap, sync::Arc};

use {
    soulxbot_config::Environment,
    soulxbot_store::{Session, StreamUser, User},
    tracing::{debug, warn},
};

use crate::{
    context::{ChatCommand, CommandContext, CommandServices},
    first::{FirstCommands, FirstExclude, FirstGive, FirstLeadersReset},
    question::QuestionCommands,
};

const DEV_SUFFIX: &str = "-dev";

/// Split `text` into a command word and the trimmed remainder, if it starts
/// with `prefix`.
pub fn parse_command(text: &str, prefix: char) -> Option<(String, String)> {
    let body = text.trim_start().strip_prefix(prefix)?;
    let (word, rest) = match body.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (body.trim_end(), ""),
    };
    if word.is_empty() {
        return None;
    }
    Some((word.to_lowercase(), rest.to_string()))
}

/// Maps command words to handlers.
///
/// Outside production every command is also reachable as `<name>-dev`, so a
/// development instance can run next to the production bot in one channel.
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn ChatCommand>>,
    environment: Environment,
    prefix: char,
}

impl CommandRegistry {
    pub fn new(environment: Environment, prefix: char) -> Self {
        Self {
            handlers: HashMap::new(),
            environment,
            prefix,
        }
    }

    /// Registry with the first-race and question-of-the-day commands.
    pub fn with_defaults(services: &CommandServices, environment: Environment, prefix: char) -> Self {
        let mut reg = Self::new(environment, prefix);

        let first: Arc<dyn ChatCommand> = Arc::new(FirstCommands::new(services.clone()));
        for name in [
            "first",
            "firstcount",
            "firstcount-all",
            "firstleaders",
            "firstleaders-all",
        ] {
            reg.register(name, Arc::clone(&first));
        }
        reg.register("firstleaders-reset", Arc::new(FirstLeadersReset::new(services.clone())));
        reg.register("firstgive", Arc::new(FirstGive::new(services.clone())));
        reg.register("firstexclude", Arc::new(FirstExclude::new(services.clone())));

        let qotd: Arc<dyn ChatCommand> = Arc::new(QuestionCommands::new(services.clone()));
        reg.register("qotd", Arc::clone(&qotd));
        reg.register("skipqotd", qotd);

        reg
    }

    pub fn register(&mut self, name: &str, handler: Arc<dyn ChatCommand>) {
        if !self.environment.is_production() {
            self.handlers
                .insert(format!("{name}{DEV_SUFFIX}"), Arc::clone(&handler));
        }
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the command in `text`, if any. Returns whether a handler ran.
    pub async fn dispatch(
        &self,
        channel: &str,
        invoker: &User,
        owner: &StreamUser,
        session: Option<&Session>,
        text: &str,
    ) -> bool {
        let Some((word, input)) = parse_command(text, self.prefix) else {
            return false;
        };
        if owner.bot_disabled() {
            debug!(channel, command = %word, "bot disabled for channel");
            return false;
        }
        let Some(handler) = self.handlers.get(&word) else {
            debug!(channel, command = %word, "unknown command");
            return false;
        };

        let command = if self.environment.is_production() {
            word
        } else {
            word.strip_suffix(DEV_SUFFIX).map(str::to_string).unwrap_or(word)
        };
        let ctx = CommandContext {
            channel: channel.to_string(),
            invoker: invoker.clone(),
            owner: owner.clone(),
            session: session.cloned(),
            command,
            input,
        };

        debug!(channel, command = %ctx.command, user = %invoker.username, "dispatching command");
        if let Err(e) = handler.run(&ctx).await {
            warn!(channel, command = %ctx.command, user = %invoker.username, error = %e, "command failed");
        }
        true
    }
}
