use {async_trait::async_trait, secrecy::Secret, soulxbot_common::Result};

use crate::types::{
    BroadcastStatus, CreatePrediction, PlatformUser, Prediction, TokenInfo, TokenPair,
};

/// Operations the bot consumes from the streaming platform.
///
/// Methods that act on a broadcaster's behalf take that broadcaster's access
/// token; see [`crate::CredentialCustodian`] for how one is obtained.
/// Lookups use an application token managed by the implementation.
///
/// Network failures and 5xx answers surface as
/// [`soulxbot_common::Error::TransientUpstream`]. A rejected token is
/// [`soulxbot_common::Error::Unauthorized`].
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Live status of the broadcaster with platform id `user_id`. Keyed by
    /// id so a rename mid-broadcast does not read as offline.
    async fn broadcast_status(&self, user_id: i64) -> Result<BroadcastStatus>;

    /// Look up users by login. Unknown logins are simply absent.
    async fn get_users(&self, logins: &[String]) -> Result<Vec<PlatformUser>>;

    /// Authorization-code grant.
    async fn exchange_code(&self, code: &str) -> Result<TokenPair>;

    /// `None` if the token is expired or revoked.
    async fn validate_token(&self, token: &Secret<String>) -> Result<Option<TokenInfo>>;

    async fn refresh_token(&self, refresh_token: &Secret<String>) -> Result<TokenPair>;

    async fn create_prediction(
        &self,
        token: &Secret<String>,
        request: &CreatePrediction,
    ) -> Result<Prediction>;

    async fn resolve_prediction(
        &self,
        token: &Secret<String>,
        broadcaster_id: &str,
        prediction_id: &str,
        winning_outcome_id: &str,
    ) -> Result<()>;

    /// Time `user_id` out of the broadcaster's chat, acting as the
    /// broadcaster.
    async fn timeout_user(
        &self,
        token: &Secret<String>,
        broadcaster_id: &str,
        user_id: &str,
        duration_secs: u32,
        reason: &str,
    ) -> Result<()>;
}
