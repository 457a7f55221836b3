use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// What the platform reports for a broadcaster right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastStatus {
    Live(StreamInfo),
    /// Explicit "not live". Transport failures are errors, never this.
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamInfo {
    /// Platform identifier of the broadcast.
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub started_at: String,
}

/// OAuth token pair as returned by the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: Secret<String>,
    pub refresh_token: Option<Secret<String>>,
    pub scopes: Vec<String>,
}

/// Result of a successful token validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    pub client_id: String,
    /// Absent for app tokens.
    pub login: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlatformUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
}

impl PlatformUser {
    /// Numeric id, as stored locally.
    pub fn numeric_id(&self) -> Option<i64> {
        self.id.parse().ok()
    }
}

/// Request body for a new channel-points prediction.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePrediction {
    pub broadcaster_id: String,
    pub title: String,
    pub outcomes: Vec<OutcomeTitle>,
    /// Seconds the prediction stays open for entries.
    pub prediction_window: u32,
}

impl CreatePrediction {
    pub fn new(broadcaster_id: impl Into<String>, title: impl Into<String>, window: u32) -> Self {
        Self {
            broadcaster_id: broadcaster_id.into(),
            title: title.into(),
            outcomes: Vec::new(),
            prediction_window: window,
        }
    }

    pub fn outcome(mut self, title: impl Into<String>) -> Self {
        self.outcomes.push(OutcomeTitle {
            title: title.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeTitle {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub broadcaster_id: String,
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub winning_outcome_id: Option<String>,
    #[serde(default)]
    pub outcomes: Vec<PredictionOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PredictionOutcome {
    pub id: String,
    pub title: String,
}

/// Helix wraps every collection in `{"data": [...]}`.
#[derive(Debug, Deserialize)]
pub(crate) struct DataResponse<T> {
    pub data: Vec<T>,
}
