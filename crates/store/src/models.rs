use serde::Serialize;

/// A chat participant as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
}

/// Sealed OAuth pair. Each half is an independent vault ciphertext.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedCredentials {
    pub access_token: Vec<u8>,
    pub refresh_token: Option<Vec<u8>>,
}

impl std::fmt::Debug for EncryptedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedCredentials")
            .field("access_token", &format_args!("[{} bytes]", self.access_token.len()))
            .field("refresh_token", &self.refresh_token.as_ref().map(Vec::len))
            .finish()
    }
}

/// Per-channel feature switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    pub first_enabled: bool,
    pub qotd_enabled: bool,
    pub bot_disabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            first_enabled: true,
            qotd_enabled: true,
            bot_disabled: false,
        }
    }
}

/// Registration record of a broadcaster.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub user_id: i64,
    /// Capability token that authorizes the go-live trigger.
    pub api_key: String,
    pub flags: FeatureFlags,
    /// Sessions started before this instant do not count towards the
    /// "first" leaderboard.
    pub first_epoch: i64,
    pub date_updated: i64,
    pub credentials: Option<EncryptedCredentials>,
}

/// A registered broadcaster: the user plus their channel config.
#[derive(Debug, Clone)]
pub struct StreamUser {
    pub user: User,
    pub config: StreamConfig,
}

impl StreamUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn first_enabled(&self) -> bool {
        self.config.flags.first_enabled
    }

    pub fn qotd_enabled(&self) -> bool {
        self.config.flags.qotd_enabled
    }

    pub fn bot_disabled(&self) -> bool {
        self.config.flags.bot_disabled
    }
}

/// Lifecycle state derived from a session row.
///
/// There is no observable opening state: a session row is created by a
/// single conditional insert guarded by the one-open-session-per-owner
/// index, so it is either absent or live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Live,
    Closed,
}

/// One broadcast, from go-live to the first explicit offline report.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub started_at: i64,
    pub ended_at: Option<i64>,
    pub first_user_id: Option<i64>,
    pub qotd_id: Option<i64>,
}

impl Session {
    pub fn state(&self) -> SessionState {
        if self.ended_at.is_some() {
            SessionState::Closed
        } else {
            SessionState::Live
        }
    }

    pub fn is_live(&self) -> bool {
        self.state() == SessionState::Live
    }

    /// Whether the platform identifier or title is still missing.
    pub fn needs_backfill(&self) -> bool {
        self.external_id.is_none() || self.title.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub disabled: bool,
    pub skip_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    pub id: i64,
    /// `None` for a global entry.
    pub owner_id: Option<i64>,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstLeader {
    pub user: User,
    pub times_first: i64,
}
