//! A whole broadcast: go-live over HTTP, the first race in chat, a repeat
//! `!first`, then the poller closing the session once the stream is offline.

use std::{sync::Arc, time::Duration};

use {
    axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    },
    soulxbot_channels::{ChatMessage, testing::RecordingOutbound},
    soulxbot_chat::{ChatBot, CommandRegistry, CommandServices, FirstRace, RaceOutcome},
    soulxbot_config::Environment,
    soulxbot_gateway::{GatewayState, OAuthSettings, build_gateway_app},
    soulxbot_sessions::SessionPoller,
    soulxbot_store::Store,
    soulxbot_twitch::{
        CredentialCustodian,
        testing::{FakePlatform, FakeStatus},
    },
    soulxbot_vault::fast_vault,
    tower::ServiceExt,
};

#[tokio::test]
async fn go_live_race_and_offline_close() {
    let store = Store::in_memory().await.unwrap();
    store.upsert_user(1, "streamer", "Streamer").await.unwrap();
    store.register_stream_user(1, "key-1", None, 0).await.unwrap();

    let platform = Arc::new(FakePlatform::default());
    platform.set_fallback_status(FakeStatus::live("s-1", "Speedruns"));
    let poller = SessionPoller::new(store.clone(), platform.clone(), Duration::from_millis(20));
    let custodian = Arc::new(CredentialCustodian::new(
        store.clone(),
        fast_vault("lifecycle").unwrap(),
        platform.clone(),
    ));

    let state = Arc::new(GatewayState::new(
        store.clone(),
        Arc::clone(&poller),
        platform.clone(),
        Arc::clone(&custodian),
        None,
        OAuthSettings {
            oauth_url: "https://id.twitch.tv/oauth2".into(),
            client_id: "test-client".into(),
            redirect_uri: "http://localhost:8080/oauth/callback".into(),
            scopes: Vec::new(),
        },
    ));
    let app = build_gateway_app(state);

    let outbound = Arc::new(RecordingOutbound::default());
    let services = CommandServices {
        store: store.clone(),
        outbound: outbound.clone(),
        api: platform.clone(),
        custodian,
    };
    let registry = CommandRegistry::with_defaults(&services, Environment::Production, '!');
    let bot = ChatBot::new(services.clone(), registry);

    // go live
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/golive?key=key-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let session_id = body["sessionId"].as_i64().unwrap();
    assert!(poller.is_polling(session_id));

    // first chatter wins the session the gateway opened
    bot.handle_message(&ChatMessage::new("streamer", 10, "Alice", "hello chat"))
        .await
        .unwrap();
    let live = store.find_open_session(1).await.unwrap().unwrap();
    assert_eq!(live.id, session_id);
    assert_eq!(live.first_user_id, Some(10));

    bot.handle_message(&ChatMessage::new("streamer", 11, "Bob", "!first"))
        .await
        .unwrap();
    assert_eq!(outbound.texts(), [
        "Congratulations Alice! You're first!",
        "Sorry Bob, you are not first. Alice was!",
    ]);

    // a live tick records the platform id before the stream ends
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.find_session(session_id).await.unwrap().unwrap().needs_backfill() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // stream ends; the next tick closes the session and the task exits
    platform.set_fallback_status(FakeStatus::Offline);
    tokio::time::timeout(Duration::from_secs(5), async {
        while poller.is_polling(session_id) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let closed = store.find_session(session_id).await.unwrap().unwrap();
    assert!(closed.ended_at.is_some());
    assert_eq!(closed.external_id.as_deref(), Some("s-1"));
    assert_eq!(closed.first_user_id, Some(10));
    assert!(store.find_open_session(1).await.unwrap().is_none());

    // a later message finds no live session
    let owner = store.find_stream_user(1).await.unwrap().unwrap();
    let carol = store.upsert_user(12, "carol", "Carol").await.unwrap();
    let session = store.find_open_session(1).await.unwrap();
    let outcome = FirstRace::new(services)
        .evaluate("streamer", &carol, &owner, session.as_ref())
        .await
        .unwrap();
    assert_eq!(outcome, RaceOutcome::Closed);

    bot.handle_message(&ChatMessage::new("streamer", 12, "Carol", "am I first?"))
        .await
        .unwrap();
    assert_eq!(outbound.texts().len(), 2);
}
