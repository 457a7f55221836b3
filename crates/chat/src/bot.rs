use std::sync::Arc;

use {
    soulxbot_channels::ChatMessage,
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::{
    context::CommandServices,
    first::FirstRace,
    registry::CommandRegistry,
};

/// Inbound chat pipeline: record the sender, run the first race, then
/// dispatch any command.
pub struct ChatBot {
    services: CommandServices,
    registry: CommandRegistry,
    race: FirstRace,
}

impl ChatBot {
    pub fn new(services: CommandServices, registry: CommandRegistry) -> Self {
        Self {
            race: FirstRace::new(services.clone()),
            services,
            registry,
        }
    }

    /// Handle one message.
    ///
    /// The session is read once, before the race, and commands see that
    /// snapshot: the message that wins the race is not also answered as a
    /// repeat `!first`.
    pub async fn handle_message(&self, msg: &ChatMessage) -> anyhow::Result<()> {
        let store = &self.services.store;
        let sender = store
            .upsert_user(msg.user_id, &msg.username, &msg.display_name)
            .await?;

        let Some(owner) = store.find_stream_user_by_username(&msg.channel).await? else {
            debug!(channel = %msg.channel, "message in unregistered channel");
            return Ok(());
        };
        let session = store.find_open_session(owner.id()).await?;

        if let Err(e) = self
            .race
            .evaluate(&msg.channel, &sender, &owner, session.as_ref())
            .await
        {
            warn!(channel = %msg.channel, user = %sender.username, error = %e, "first race failed");
        }

        self.registry
            .dispatch(&msg.channel, &sender, &owner, session.as_ref(), &msg.text)
            .await;
        Ok(())
    }

    /// Process messages one at a time until the sender side closes.
    pub async fn run(self: Arc<Self>, mut inbound: mpsc::UnboundedReceiver<ChatMessage>) {
        info!(commands = self.registry.command_names().len(), "chat bot running");
        while let Some(msg) = inbound.recv().await {
            if let Err(e) = self.handle_message(&msg).await {
                warn!(channel = %msg.channel, user = %msg.username, error = %e, "chat message failed");
            }
        }
        info!("chat bot stopped");
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::test_support::Harness,
        soulxbot_config::Environment,
    };

    fn bot(h: &Harness, environment: Environment) -> ChatBot {
        let registry = CommandRegistry::with_defaults(&h.services, environment, '!');
        ChatBot::new(h.services.clone(), registry)
    }

    #[tokio::test]
    async fn race_then_commands_in_one_stream() {
        let h = Harness::new().await;
        h.owner_credentials("owner-access").await;
        let bot = bot(&h, Environment::Production);
        h.go_live().await;

        for msg in [
            ChatMessage::new("#Streamer", 1, "Streamer", "hello chat"),
            ChatMessage::new("streamer", 10, "Alice", "!first"),
            ChatMessage::new("streamer", 11, "Bob", "!first"),
            ChatMessage::new("streamer", 10, "Alice", "!first"),
        ] {
            bot.handle_message(&msg).await.unwrap();
        }

        assert_eq!(h.outbound.said()[0].0, "streamer");
        assert_eq!(h.outbound.texts(), [
            "Congratulations Alice! You're first!",
            "Sorry Bob, you are not first. Alice was!",
            "Yes Alice! We KNOW. You were first...",
        ]);
        assert_eq!(h.platform.timeouts().len(), 1);
    }

    #[tokio::test]
    async fn unregistered_channels_are_only_recorded() {
        let h = Harness::new().await;
        let bot = bot(&h, Environment::Production);

        let msg = ChatMessage::new("elsewhere", 10, "Alice", "!firstcount");
        bot.handle_message(&msg).await.unwrap();

        assert!(h.outbound.texts().is_empty());
        let alice = h.services.store.find_user(10).await.unwrap().unwrap();
        assert_eq!(alice.username, "alice");
    }

    #[tokio::test]
    async fn name_changes_are_recorded() {
        let h = Harness::new().await;
        let bot = bot(&h, Environment::Production);

        bot.handle_message(&ChatMessage::new("streamer", 10, "Alice", "hi"))
            .await
            .unwrap();
        bot.handle_message(&ChatMessage::new("streamer", 10, "AliceTwo", "hi"))
            .await
            .unwrap();

        let user = h.services.store.find_user(10).await.unwrap().unwrap();
        assert_eq!(user.display_name, "AliceTwo");
        assert_eq!(user.username, "alicetwo");
    }

    #[tokio::test]
    async fn dev_commands_answer_in_development() {
        let h = Harness::new().await;
        let bot = bot(&h, Environment::Development);

        bot.handle_message(&ChatMessage::new("streamer", 10, "Alice", "!firstcount-dev"))
            .await
            .unwrap();
        assert_eq!(h.outbound.texts(), ["Alice, you have been first 0 times"]);
    }

    #[tokio::test]
    async fn run_drains_the_inbound_queue() {
        let h = Harness::new().await;
        let bot = Arc::new(bot(&h, Environment::Production));
        h.go_live().await;

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ChatMessage::new("streamer", 10, "Alice", "first!"))
            .unwrap();
        tx.send(ChatMessage::new("streamer", 11, "Bob", "me first"))
            .unwrap();
        drop(tx);
        bot.run(rx).await;

        assert_eq!(h.outbound.texts(), ["Congratulations Alice! You're first!"]);
    }
}
