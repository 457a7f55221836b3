use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use {
    secrecy::Secret,
    soulxbot_channels::TwitchChat,
    soulxbot_config::TwitchSection,
    soulxbot_sessions::SessionPoller,
    soulxbot_store::Store,
    soulxbot_twitch::{CredentialCustodian, PlatformApi},
    tokio::sync::Mutex,
};

/// How long an authorization redirect stays redeemable.
pub const OAUTH_STATE_TTL: Duration = Duration::from_secs(600);
const OAUTH_STATE_MAX: usize = 1024;

// ── Pending OAuth states ─────────────────────────────────────────────────────

/// Single-use `state` values handed out by `/oauth/authorize`.
pub struct PendingStates {
    entries: HashMap<String, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for PendingStates {
    fn default() -> Self {
        Self::new(OAUTH_STATE_TTL)
    }
}

impl PendingStates {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            max_entries: OAUTH_STATE_MAX,
        }
    }

    pub fn insert(&mut self, state: &str) {
        self.evict_expired();
        if self.entries.len() >= self.max_entries
            && let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, issued)| **issued)
                .map(|(k, _)| k.clone())
        {
            self.entries.remove(&oldest);
        }
        self.entries.insert(state.to_string(), Instant::now());
    }

    /// Redeem `state`. True at most once per issued value, and only within
    /// the TTL.
    pub fn take(&mut self, state: &str) -> bool {
        self.evict_expired();
        self.entries.remove(state).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&mut self) {
        let ttl = self.ttl;
        self.entries.retain(|_, issued| issued.elapsed() < ttl);
    }
}

// ── OAuth settings ───────────────────────────────────────────────────────────

/// What `/oauth/authorize` needs to build the platform redirect.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub oauth_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl From<&TwitchSection> for OAuthSettings {
    fn from(section: &TwitchSection) -> Self {
        Self {
            oauth_url: section.oauth_url.clone(),
            client_id: section.client_id.clone(),
            redirect_uri: section.redirect_uri.clone(),
            scopes: section.scopes.clone(),
        }
    }
}

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared state of the HTTP surface.
pub struct GatewayState {
    pub store: Store,
    pub poller: Arc<SessionPoller>,
    pub api: Arc<dyn PlatformApi>,
    pub custodian: Arc<CredentialCustodian>,
    /// `user:password` accepted on admin endpoints.
    pub operator: Option<Secret<String>>,
    pub oauth: OAuthSettings,
    pub pending_states: Mutex<PendingStates>,
    /// Chat connection; newly registered channels are joined right away.
    pub chat: Option<TwitchChat>,
    pub version: String,
}

impl GatewayState {
    pub fn new(
        store: Store,
        poller: Arc<SessionPoller>,
        api: Arc<dyn PlatformApi>,
        custodian: Arc<CredentialCustodian>,
        operator: Option<Secret<String>>,
        oauth: OAuthSettings,
    ) -> Self {
        Self {
            store,
            poller,
            api,
            custodian,
            operator,
            oauth,
            pending_states: Mutex::new(PendingStates::default()),
            chat: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_chat(mut self, chat: TwitchChat) -> Self {
        self.chat = Some(chat);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_single_use() {
        let mut states = PendingStates::default();
        states.insert("abc");
        assert!(states.take("abc"));
        assert!(!states.take("abc"));
        assert!(!states.take("never-issued"));
    }

    #[test]
    fn expired_states_are_refused() {
        let mut states = PendingStates::new(Duration::ZERO);
        states.insert("abc");
        assert!(!states.take("abc"));
        assert!(states.is_empty());
    }

    #[test]
    fn oldest_state_is_evicted_when_full() {
        let mut states = PendingStates::default();
        states.max_entries = 2;
        states.insert("a");
        std::thread::sleep(Duration::from_millis(2));
        states.insert("b");
        states.insert("c");
        assert_eq!(states.len(), 2);
        assert!(!states.take("a"));
        assert!(states.take("c"));
    }
}
