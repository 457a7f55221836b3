//! Scriptable in-memory [`PlatformApi`] for tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    soulxbot_common::{Error, Result},
};

use crate::{
    api::PlatformApi,
    types::{
        BroadcastStatus, CreatePrediction, PlatformUser, Prediction, PredictionOutcome,
        StreamInfo, TokenInfo, TokenPair,
    },
};

/// One scripted answer to `broadcast_status`.
#[derive(Debug, Clone)]
pub enum FakeStatus {
    Live { id: String, title: String },
    Offline,
    /// Answer with a transient upstream error.
    Unreachable,
}

impl FakeStatus {
    pub fn live(id: &str, title: &str) -> Self {
        Self::Live {
            id: id.into(),
            title: title.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTimeout {
    pub broadcaster_id: String,
    pub user_id: String,
    pub duration_secs: u32,
}

#[derive(Default)]
struct State {
    statuses: VecDeque<FakeStatus>,
    status_queries: Vec<i64>,
    fallback: Option<FakeStatus>,
    users: Vec<PlatformUser>,
    valid_tokens: HashSet<String>,
    identities: HashMap<String, TokenInfo>,
    refreshes: HashMap<String, (String, Option<String>)>,
    codes: HashMap<String, (String, Option<String>)>,
    timeouts: Vec<RecordedTimeout>,
}

/// Platform fake. Statuses are served from a queue; once it is empty the
/// fallback (default: offline) repeats.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<State>,
    pub status_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
}

impl FakePlatform {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_status(&self, status: FakeStatus) {
        self.state().statuses.push_back(status);
    }

    pub fn set_fallback_status(&self, status: FakeStatus) {
        self.state().fallback = Some(status);
    }

    pub fn add_user(&self, id: i64, login: &str, display_name: &str) {
        self.state().users.push(PlatformUser {
            id: id.to_string(),
            login: login.into(),
            display_name: display_name.into(),
        });
    }

    pub fn accept_token(&self, token: &str) {
        self.state().valid_tokens.insert(token.into());
    }

    /// Make `token` valid and identify it as `login`/`user_id`.
    pub fn set_identity(&self, token: &str, user_id: i64, login: &str) {
        let mut state = self.state();
        state.valid_tokens.insert(token.into());
        state.identities.insert(token.into(), TokenInfo {
            client_id: "fake-client".into(),
            login: Some(login.into()),
            user_id: Some(user_id.to_string()),
            scopes: Vec::new(),
            expires_in: 3600,
        });
    }

    /// Refreshing with `refresh_token` yields `access` (which becomes valid).
    pub fn on_refresh(&self, refresh_token: &str, access: &str, new_refresh: Option<&str>) {
        self.state().refreshes.insert(
            refresh_token.into(),
            (access.into(), new_refresh.map(Into::into)),
        );
    }

    /// Exchanging `code` yields the given pair.
    pub fn on_code(&self, code: &str, access: &str, refresh: Option<&str>) {
        self.state()
            .codes
            .insert(code.into(), (access.into(), refresh.map(Into::into)));
    }

    /// Broadcaster ids passed to `broadcast_status`, in call order.
    pub fn status_queries(&self) -> Vec<i64> {
        self.state().status_queries.clone()
    }

    pub fn timeouts(&self) -> Vec<RecordedTimeout> {
        self.state().timeouts.clone()
    }

    fn check_token(&self, token: &Secret<String>) -> Result<()> {
        if self.state().valid_tokens.contains(token.expose_secret()) {
            Ok(())
        } else {
            Err(Error::Unauthorized)
        }
    }
}

fn pair(access: String, refresh: Option<String>) -> TokenPair {
    TokenPair {
        access_token: Secret::new(access),
        refresh_token: refresh.map(Secret::new),
        scopes: Vec::new(),
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn broadcast_status(&self, user_id: i64) -> Result<BroadcastStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut state = self.state();
            state.status_queries.push(user_id);
            state
                .statuses
                .pop_front()
                .or_else(|| state.fallback.clone())
                .unwrap_or(FakeStatus::Offline)
        };
        match next {
            FakeStatus::Live { id, title } => Ok(BroadcastStatus::Live(StreamInfo {
                id,
                user_id: user_id.to_string(),
                user_login: String::new(),
                title,
                started_at: String::new(),
            })),
            FakeStatus::Offline => Ok(BroadcastStatus::Offline),
            FakeStatus::Unreachable => Err(Error::upstream("fake platform unreachable")),
        }
    }

    async fn get_users(&self, logins: &[String]) -> Result<Vec<PlatformUser>> {
        let state = self.state();
        Ok(state
            .users
            .iter()
            .filter(|u| logins.iter().any(|l| l.eq_ignore_ascii_case(&u.login)))
            .cloned()
            .collect())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenPair> {
        let found = self.state().codes.remove(code);
        match found {
            Some((access, refresh)) => Ok(pair(access, refresh)),
            None => Err(Error::BadRequest("invalid authorization code".into())),
        }
    }

    async fn validate_token(&self, token: &Secret<String>) -> Result<Option<TokenInfo>> {
        let state = self.state();
        if !state.valid_tokens.contains(token.expose_secret()) {
            return Ok(None);
        }
        Ok(Some(
            state
                .identities
                .get(token.expose_secret())
                .cloned()
                .unwrap_or(TokenInfo {
                    client_id: "fake-client".into(),
                    login: None,
                    user_id: None,
                    scopes: Vec::new(),
                    expires_in: 3600,
                }),
        ))
    }

    async fn refresh_token(&self, refresh_token: &Secret<String>) -> Result<TokenPair> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        // Widen the window for concurrent callers.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let found = self
            .state()
            .refreshes
            .get(refresh_token.expose_secret())
            .cloned();
        let Some((access, refresh)) = found else {
            return Err(Error::Unauthorized);
        };
        self.state().valid_tokens.insert(access.clone());
        Ok(pair(access, refresh))
    }

    async fn create_prediction(
        &self,
        token: &Secret<String>,
        request: &CreatePrediction,
    ) -> Result<Prediction> {
        self.check_token(token)?;
        Ok(Prediction {
            id: "fake-prediction".into(),
            broadcaster_id: request.broadcaster_id.clone(),
            title: request.title.clone(),
            status: "ACTIVE".into(),
            winning_outcome_id: None,
            outcomes: request
                .outcomes
                .iter()
                .enumerate()
                .map(|(i, o)| PredictionOutcome {
                    id: format!("outcome-{i}"),
                    title: o.title.clone(),
                })
                .collect(),
        })
    }

    async fn resolve_prediction(
        &self,
        token: &Secret<String>,
        _broadcaster_id: &str,
        _prediction_id: &str,
        _winning_outcome_id: &str,
    ) -> Result<()> {
        self.check_token(token)
    }

    async fn timeout_user(
        &self,
        token: &Secret<String>,
        broadcaster_id: &str,
        user_id: &str,
        duration_secs: u32,
        _reason: &str,
    ) -> Result<()> {
        self.check_token(token)?;
        self.state().timeouts.push(RecordedTimeout {
            broadcaster_id: broadcaster_id.into(),
            user_id: user_id.into(),
            duration_secs,
        });
        Ok(())
    }
}
