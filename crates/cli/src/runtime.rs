use std::sync::Arc;

use {
    anyhow::{Context, Result},
    soulxbot_channels::{TwitchChat, TwitchChatConfig},
    soulxbot_chat::{ChatBot, CommandRegistry, CommandServices},
    soulxbot_config::BotConfig,
    soulxbot_gateway::{GatewayState, OAuthSettings, start_gateway},
    soulxbot_sessions::SessionPoller,
    soulxbot_store::Store,
    soulxbot_twitch::{CredentialCustodian, HelixClient, PlatformApi},
    soulxbot_vault::Vault,
    tracing::{info, warn},
};

pub async fn open_store(config: &BotConfig) -> Result<Store> {
    Store::connect(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("failed to open database {}", config.database.url))
}

/// Storage, platform client and credential custody built from config.
pub struct Runtime {
    pub config: BotConfig,
    pub store: Store,
    pub api: Arc<dyn PlatformApi>,
    pub custodian: Arc<CredentialCustodian>,
}

impl Runtime {
    pub async fn new(config: BotConfig) -> Result<Self> {
        let passphrase = config
            .vault
            .passphrase
            .as_ref()
            .context("vault.passphrase is not set")?;
        let api: Arc<dyn PlatformApi> = Arc::new(HelixClient::from_config(&config.twitch)?);
        let vault = Vault::with_salt(passphrase, &config.vault.salt)
            .context("failed to derive the vault key")?;
        let store = open_store(&config).await?;
        let custodian = Arc::new(CredentialCustodian::new(store.clone(), vault, Arc::clone(&api)));
        Ok(Self {
            config,
            store,
            api,
            custodian,
        })
    }
}

/// Run everything: chat, session pollers and the HTTP API.
pub async fn serve(config: BotConfig, bind: Option<String>, port: Option<u16>) -> Result<()> {
    let Runtime {
        config,
        store,
        api,
        custodian,
    } = Runtime::new(config).await?;

    if store.add_exclusion(None, &config.bot.username).await? {
        info!(user = %config.bot.username, "bot login excluded from first");
    }

    let poller = SessionPoller::new(store.clone(), Arc::clone(&api), config.poller.interval());
    info!(interval_secs = poller.interval().as_secs(), "session poller ready");

    let channels: Vec<String> = store
        .list_stream_users()
        .await?
        .into_iter()
        .map(|owner| owner.user.username)
        .collect();
    info!(count = channels.len(), "registered channels");

    let chat = match &config.bot.chat_token {
        Some(token) => {
            let chat_config = TwitchChatConfig {
                url: config.twitch.chat_url.clone(),
                login: config.bot.username.clone(),
                token: token.clone(),
            };
            let (chat, inbound, _connection) = TwitchChat::spawn(chat_config, channels);
            let services = CommandServices {
                store: store.clone(),
                outbound: Arc::new(chat.clone()),
                api: Arc::clone(&api),
                custodian: Arc::clone(&custodian),
            };
            let registry = CommandRegistry::with_defaults(
                &services,
                config.bot.environment,
                config.bot.command_prefix,
            );
            let bot = Arc::new(ChatBot::new(services, registry));
            tokio::spawn(bot.run(inbound));
            Some(chat)
        },
        None => {
            warn!("bot.chat_token is not set, chat is disabled");
            None
        },
    };

    poller.restart_open_sessions().await?;

    if config.server.basic_auth.is_none() {
        warn!("server.basic_auth is not set, admin endpoints will refuse every request");
    }
    let mut state = GatewayState::new(
        store,
        poller,
        api,
        custodian,
        config.server.basic_auth.clone(),
        OAuthSettings::from(&config.twitch),
    );
    if let Some(chat) = chat {
        state = state.with_chat(chat);
    }

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let port = port.unwrap_or(config.server.port);
    start_gateway(Arc::new(state), &bind, port).await
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    #[tokio::test]
    async fn opens_a_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BotConfig::default();
        config.database.url = format!("sqlite://{}", dir.path().join("bot.db").display());

        let store = open_store(&config).await.unwrap();
        assert!(store.list_stream_users().await.unwrap().is_empty());
        assert!(dir.path().join("bot.db").exists());
    }

    #[tokio::test]
    async fn runtime_requires_a_vault_passphrase() {
        let config = BotConfig::default();
        let err = Runtime::new(config).await.err().unwrap();
        assert!(err.to_string().contains("vault.passphrase"));
    }

    #[tokio::test]
    async fn runtime_requires_platform_credentials() {
        let mut config = BotConfig::default();
        config.vault.passphrase = Some(Secret::new("correct horse".into()));
        let err = Runtime::new(config).await.err().unwrap();
        assert!(err.to_string().contains("client_secret"));
    }
}
