//! Helix and OAuth HTTP client.

use {
    async_trait::async_trait,
    reqwest::{Method, RequestBuilder, Response, StatusCode},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, de::DeserializeOwned},
    serde_json::json,
    soulxbot_common::{Error, Result},
    soulxbot_config::TwitchSection,
    tokio::sync::Mutex,
    tracing::{debug, warn},
};

use crate::{
    api::PlatformApi,
    types::{
        BroadcastStatus, CreatePrediction, DataResponse, PlatformUser, Prediction, StreamInfo,
        TokenInfo, TokenPair,
    },
};

/// Max logins per `/users` call.
const USERS_PER_REQUEST: usize = 100;

pub struct HelixClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: Secret<String>,
    redirect_uri: String,
    helix_url: String,
    oauth_url: String,
    /// Lazily acquired client-credentials token.
    app_token: Mutex<Option<Secret<String>>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Vec<String>,
}

impl From<TokenResponse> for TokenPair {
    fn from(r: TokenResponse) -> Self {
        Self {
            access_token: Secret::new(r.access_token),
            refresh_token: r.refresh_token.map(Secret::new),
            scopes: r.scope,
        }
    }
}

impl HelixClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: Secret<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        let defaults = TwitchSection::default();
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
            helix_url: defaults.helix_url,
            oauth_url: defaults.oauth_url,
            app_token: Mutex::new(None),
        }
    }

    /// Build from the `[twitch]` config section. The client secret is
    /// required.
    pub fn from_config(section: &TwitchSection) -> Result<Self> {
        let secret = section
            .client_secret
            .clone()
            .ok_or_else(|| Error::Config("twitch.client_secret is not set".into()))?;
        if section.client_id.is_empty() {
            return Err(Error::Config("twitch.client_id is not set".into()));
        }
        Ok(Self::new(&section.client_id, secret, &section.redirect_uri)
            .with_helix_url(&section.helix_url)
            .with_oauth_url(&section.oauth_url))
    }

    pub fn with_helix_url(mut self, url: &str) -> Self {
        self.helix_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_oauth_url(mut self, url: &str) -> Self {
        self.oauth_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn app_token(&self) -> Result<Secret<String>> {
        let mut cached = self.app_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let resp = self
            .client
            .post(format!("{}/token", self.oauth_url))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret().as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;
        let pair: TokenPair = check_status(resp).await?.json::<TokenResponse>().await?.into();
        debug!("acquired app access token");
        *cached = Some(pair.access_token.clone());
        Ok(pair.access_token)
    }

    async fn drop_app_token(&self) {
        *self.app_token.lock().await = None;
    }

    /// GET a Helix collection with the app token. A 401 drops the cached
    /// token and retries once with a fresh one.
    async fn helix_get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut retried = false;
        loop {
            let token = self.app_token().await?;
            let resp = self
                .client
                .get(format!("{}{path}", self.helix_url))
                .query(query)
                .bearer_auth(token.expose_secret())
                .header("Client-Id", &self.client_id)
                .send()
                .await?;
            if resp.status() == StatusCode::UNAUTHORIZED && !retried {
                debug!(path, "app token rejected, renewing");
                self.drop_app_token().await;
                retried = true;
                continue;
            }
            let body = check_status(resp).await?.json::<DataResponse<T>>().await?;
            return Ok(body.data);
        }
    }

    fn user_request(&self, method: Method, path: &str, token: &Secret<String>) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.helix_url))
            .bearer_auth(token.expose_secret())
            .header("Client-Id", &self.client_id)
    }

    async fn token_grant(&self, params: &[(&str, &str)]) -> Result<TokenPair> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret().as_str()),
        ];
        form.extend_from_slice(params);
        let resp = self
            .client
            .post(format!("{}/token", self.oauth_url))
            .form(&form)
            .send()
            .await?;
        Ok(check_status(resp).await?.json::<TokenResponse>().await?.into())
    }
}

/// Map a non-success response onto the error taxonomy.
async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().path().to_string();
    let body = resp.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED => Err(Error::Unauthorized),
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            warn!(status = %s, url = %url, "platform request failed");
            Err(Error::upstream(format!("{s} from {url}")))
        },
        s => Err(Error::BadRequest(format!("platform rejected {url}: {s} {body}"))),
    }
}

#[async_trait]
impl PlatformApi for HelixClient {
    async fn broadcast_status(&self, user_id: i64) -> Result<BroadcastStatus> {
        let user_id = user_id.to_string();
        let streams: Vec<StreamInfo> =
            self.helix_get("/streams", &[("user_id", user_id.as_str())]).await?;
        Ok(match streams.into_iter().next() {
            Some(stream) => BroadcastStatus::Live(stream),
            None => BroadcastStatus::Offline,
        })
    }

    async fn get_users(&self, logins: &[String]) -> Result<Vec<PlatformUser>> {
        let mut users = Vec::with_capacity(logins.len());
        for chunk in logins.chunks(USERS_PER_REQUEST) {
            let query: Vec<(&str, &str)> = chunk.iter().map(|l| ("login", l.as_str())).collect();
            users.extend(self.helix_get::<PlatformUser>("/users", &query).await?);
        }
        Ok(users)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenPair> {
        self.token_grant(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    async fn validate_token(&self, token: &Secret<String>) -> Result<Option<TokenInfo>> {
        let resp = self
            .client
            .get(format!("{}/validate", self.oauth_url))
            .header("Authorization", format!("OAuth {}", token.expose_secret()))
            .send()
            .await?;
        match check_status(resp).await {
            Ok(resp) => Ok(Some(resp.json::<TokenInfo>().await?)),
            Err(Error::Unauthorized) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn refresh_token(&self, refresh_token: &Secret<String>) -> Result<TokenPair> {
        match self
            .token_grant(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret().as_str()),
            ])
            .await
        {
            // The token endpoint answers 400 for an invalid refresh token.
            Err(Error::BadRequest(_)) => Err(Error::Unauthorized),
            other => other,
        }
    }

    async fn create_prediction(
        &self,
        token: &Secret<String>,
        request: &CreatePrediction,
    ) -> Result<Prediction> {
        let resp = self
            .user_request(Method::POST, "/predictions", token)
            .json(request)
            .send()
            .await?;
        check_status(resp)
            .await?
            .json::<DataResponse<Prediction>>()
            .await?
            .data
            .into_iter()
            .next()
            .ok_or_else(|| Error::upstream("prediction response without data"))
    }

    async fn resolve_prediction(
        &self,
        token: &Secret<String>,
        broadcaster_id: &str,
        prediction_id: &str,
        winning_outcome_id: &str,
    ) -> Result<()> {
        let resp = self
            .user_request(Method::PATCH, "/predictions", token)
            .json(&json!({
                "broadcaster_id": broadcaster_id,
                "id": prediction_id,
                "status": "RESOLVED",
                "winning_outcome_id": winning_outcome_id,
            }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn timeout_user(
        &self,
        token: &Secret<String>,
        broadcaster_id: &str,
        user_id: &str,
        duration_secs: u32,
        reason: &str,
    ) -> Result<()> {
        let resp = self
            .user_request(Method::POST, "/moderation/bans", token)
            .query(&[("broadcaster_id", broadcaster_id), ("moderator_id", broadcaster_id)])
            .json(&json!({
                "data": {
                    "user_id": user_id,
                    "duration": duration_secs,
                    "reason": reason,
                }
            }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}
