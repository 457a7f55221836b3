//! Self-service registration through the platform's authorization-code flow.
//!
//! `/oauth/authorize` redirects the broadcaster to the platform with a
//! single-use `state`; `/oauth/callback` redeems it, exchanges the code,
//! asks the platform whose token it is and registers that user with the
//! sealed token pair.

use std::sync::Arc;

use {
    axum::{
        extract::{Query, State},
        response::Redirect,
    },
    serde::Deserialize,
    soulxbot_common::{Error, time::now_ms},
    soulxbot_twitch::{authorize_url, generate_state},
    tracing::debug,
};

use crate::{
    auth::generate_api_key, error::ApiResult, server::finish_registration, state::GatewayState,
};

pub(crate) async fn oauth_authorize(
    State(state): State<Arc<GatewayState>>,
) -> ApiResult<Redirect> {
    let oauth = &state.oauth;
    if oauth.client_id.is_empty() {
        return Err(Error::Config("twitch.client_id is not set".into()).into());
    }
    let csrf = generate_state();
    let url = authorize_url(
        &oauth.oauth_url,
        &oauth.client_id,
        &oauth.redirect_uri,
        &oauth.scopes,
        &csrf,
    )?;
    state.pending_states.lock().await.insert(&csrf);
    debug!("authorization redirect issued");
    Ok(Redirect::to(url.as_str()))
}

#[derive(Deserialize)]
pub(crate) struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub(crate) async fn oauth_callback(
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<CallbackParams>,
) -> ApiResult<String> {
    let csrf = params
        .state
        .ok_or_else(|| Error::BadRequest("missing state".into()))?;
    if !state.pending_states.lock().await.take(&csrf) {
        return Err(Error::BadRequest("unknown or expired state".into()).into());
    }
    if let Some(error) = params.error {
        return Err(Error::BadRequest(format!("authorization denied: {error}")).into());
    }
    let code = params
        .code
        .ok_or_else(|| Error::BadRequest("missing code".into()))?;

    let pair = state.api.exchange_code(&code).await?;
    let identity = state
        .api
        .validate_token(&pair.access_token)
        .await?
        .ok_or(Error::Unauthorized)?;
    let (Some(login), Some(user_id)) = (identity.login, identity.user_id) else {
        return Err(Error::BadRequest("token is not bound to a user".into()).into());
    };
    let user_id: i64 = user_id
        .parse()
        .map_err(|_| Error::upstream(format!("non-numeric user id {user_id}")))?;

    let display_name = state
        .api
        .get_users(std::slice::from_ref(&login))
        .await?
        .into_iter()
        .find(|u| u.login.eq_ignore_ascii_case(&login))
        .map_or_else(|| login.clone(), |u| u.display_name);

    state
        .store
        .upsert_user(user_id, &login, &display_name)
        .await?;
    let sealed = state.custodian.seal(&pair)?;
    let api_key = generate_api_key();
    let owner = state
        .store
        .register_stream_user(user_id, &api_key, Some(&sealed), now_ms())
        .await?;
    finish_registration(&state, &owner).await;
    Ok(api_key)
}
