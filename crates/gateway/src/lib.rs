//! HTTP surface: go-live trigger, channel registration (operator and OAuth
//! variants), question management and health.
//!
//! Handlers stay thin. Session lifecycle lives in `soulxbot-sessions`,
//! credential custody in `soulxbot-twitch`, storage in `soulxbot-store`.

pub mod auth;
pub mod error;
pub mod oauth;
pub mod server;
pub mod state;

pub use {
    error::{ApiError, ApiResult},
    server::{build_gateway_app, start_gateway},
    state::{GatewayState, OAuthSettings},
};

#[cfg(test)]
pub(crate) mod test_support {
    use std::{sync::Arc, time::Duration};

    use {
        axum::Router,
        base64::{Engine, engine::general_purpose::STANDARD},
        secrecy::Secret,
        soulxbot_sessions::SessionPoller,
        soulxbot_store::Store,
        soulxbot_twitch::{CredentialCustodian, testing::FakePlatform},
        soulxbot_vault::fast_vault,
    };

    use crate::{
        server::build_gateway_app,
        state::{GatewayState, OAuthSettings},
    };

    pub fn basic(user_pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(user_pass))
    }

    /// Router over an in-memory store with one registered broadcaster
    /// (id 1, "streamer", key "key-1") and operator `admin:hunter2`.
    pub struct TestGateway {
        pub app: Router,
        pub state: Arc<GatewayState>,
        pub platform: Arc<FakePlatform>,
    }

    impl TestGateway {
        pub async fn new() -> Self {
            let store = Store::in_memory().await.unwrap();
            store.upsert_user(1, "streamer", "Streamer").await.unwrap();
            store
                .register_stream_user(1, "key-1", None, 0)
                .await
                .unwrap();

            let platform = Arc::new(FakePlatform::default());
            // Long enough that no status check runs during a test.
            let poller =
                SessionPoller::new(store.clone(), platform.clone(), Duration::from_secs(3600));
            let custodian = Arc::new(CredentialCustodian::new(
                store.clone(),
                fast_vault("gateway-tests").unwrap(),
                platform.clone(),
            ));
            let oauth = OAuthSettings {
                oauth_url: "https://id.twitch.tv/oauth2".into(),
                client_id: "test-client".into(),
                redirect_uri: "http://localhost:8080/oauth/callback".into(),
                scopes: vec!["moderator:manage:banned_users".into()],
            };
            let state = Arc::new(GatewayState::new(
                store,
                poller,
                platform.clone(),
                custodian,
                Some(Secret::new("admin:hunter2".into())),
                oauth,
            ));
            Self {
                app: build_gateway_app(Arc::clone(&state)),
                state,
                platform,
            }
        }
    }
}
