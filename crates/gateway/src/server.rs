use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
    },
    serde::Deserialize,
    soulxbot_common::{Error, time::now_ms},
    soulxbot_store::{Question, StreamUser},
    tower_http::trace::TraceLayer,
    tracing::{info, warn},
};

use crate::{
    auth::{authorize_operator, generate_api_key},
    error::ApiResult,
    oauth::{oauth_authorize, oauth_callback},
    state::GatewayState,
};

type AppState = Arc<GatewayState>;

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the router (shared between production startup and tests).
pub fn build_gateway_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/golive", get(golive_handler).post(golive_handler))
        .route("/register", post(register_handler))
        .route("/question", post(create_question_handler))
        .route("/question/{id}", get(get_question_handler))
        .route("/oauth/authorize", get(oauth_authorize))
        .route("/oauth/callback", get(oauth_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the HTTP API until the listener fails.
pub async fn start_gateway(state: AppState, bind: &str, port: u16) -> anyhow::Result<()> {
    let app = build_gateway_app(Arc::clone(&state));

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(version = %state.version, %addr, "gateway listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Record a registration and join the channel if chat is connected.
pub(crate) async fn finish_registration(state: &GatewayState, owner: &StreamUser) {
    info!(user = %owner.username(), user_id = owner.id(), "channel registered");
    if let Some(chat) = &state.chat
        && let Err(e) = chat.join(owner.username()).await
    {
        warn!(user = %owner.username(), error = %e, "could not join registered channel");
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let live = state.store.list_open_sessions().await?.len();
    Ok(Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "liveSessions": live,
    })))
}

#[derive(Deserialize)]
struct GoLiveParams {
    key: Option<String>,
}

async fn golive_handler(
    State(state): State<AppState>,
    Query(params): Query<GoLiveParams>,
) -> ApiResult<impl IntoResponse> {
    let key = params.key.filter(|k| !k.is_empty()).ok_or(Error::Unauthorized)?;
    let session = state.poller.open_session(&key).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "sessionId": session.id,
            "startedAt": session.started_at,
        })),
    ))
}

#[derive(Deserialize)]
struct RegisterParams {
    username: Option<String>,
}

async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RegisterParams>,
) -> ApiResult<String> {
    authorize_operator(&headers, state.operator.as_ref())?;

    let username = params
        .username
        .map(|u| u.trim().trim_start_matches('@').to_lowercase())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| Error::BadRequest("username is required".into()))?;
    let user = state
        .store
        .find_user_by_username(&username)
        .await?
        .ok_or_else(|| Error::not_found("user not found, have the user chat in a channel first"))?;

    let api_key = generate_api_key();
    let owner = state
        .store
        .register_stream_user(user.id, &api_key, None, now_ms())
        .await?;
    finish_registration(&state, &owner).await;
    Ok(api_key)
}

#[derive(Deserialize)]
struct NewQuestion {
    text: String,
}

async fn create_question_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NewQuestion>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    authorize_operator(&headers, state.operator.as_ref())?;
    let question = state.store.create_question(&body.text).await?;
    info!(question_id = question.id, "question added");
    Ok((StatusCode::CREATED, Json(question)))
}

async fn get_question_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Question>> {
    let question = state
        .store
        .find_question(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("question {id}")))?;
    Ok(Json(question))
}
