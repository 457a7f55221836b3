/// Config schema types (bot identity, platform credentials, vault, storage,
/// HTTP server, poller cadence).
use std::time::Duration;

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
    soulxbot_vault::DEFAULT_SALT,
};

/// Seconds between two status checks of a live session unless configured.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub bot: BotSection,
    pub twitch: TwitchSection,
    pub vault: VaultSection,
    pub database: DatabaseSection,
    pub server: ServerSection,
    pub poller: PollerSection,
}

/// Which command set a running instance answers to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Chat identity of the bot itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotSection {
    /// Login the bot chats as. Also seeded as a global first-race exclusion.
    pub username: String,

    /// Chat token (`oauth:...`) used to authenticate the chat connection.
    pub chat_token: Option<Secret<String>>,

    pub environment: Environment,

    /// Character that marks a chat message as a command.
    pub command_prefix: char,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            username: "soulxbot".into(),
            chat_token: None,
            environment: Environment::default(),
            command_prefix: '!',
        }
    }
}

/// Platform application credentials and endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TwitchSection {
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,

    /// Redirect URI registered for the authorization-code flow.
    pub redirect_uri: String,

    /// Scopes requested from broadcasters at registration.
    pub scopes: Vec<String>,

    pub helix_url: String,
    pub oauth_url: String,
    pub chat_url: String,
}

impl Default for TwitchSection {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            redirect_uri: "http://localhost:8080/oauth/callback".into(),
            scopes: vec![
                "channel:manage:predictions".into(),
                "moderator:manage:banned_users".into(),
            ],
            helix_url: "https://api.twitch.tv/helix".into(),
            oauth_url: "https://id.twitch.tv/oauth2".into(),
            chat_url: "wss://irc-ws.chat.twitch.tv:443".into(),
        }
    }
}

/// Credential vault settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VaultSection {
    /// Passphrase the token encryption key is derived from.
    pub passphrase: Option<Secret<String>>,

    /// KDF salt. Changing it makes every stored credential unreadable.
    pub salt: String,
}

impl Default for VaultSection {
    fn default() -> Self {
        Self {
            passphrase: None,
            salt: DEFAULT_SALT.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite://soulxbot.db".into(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    pub port: u16,

    /// `user:password` accepted as HTTP Basic credentials by the
    /// registration and question endpoints.
    pub basic_auth: Option<Secret<String>>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            basic_auth: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerSection {
    /// Seconds between broadcast status checks of a live session.
    pub interval_secs: u64,
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl PollerSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}
