use std::{sync::Arc, time::Duration};

use {
    dashmap::DashSet,
    soulxbot_common::{Error, Result, time::now_ms},
    soulxbot_store::{Session, Store},
    soulxbot_twitch::{BroadcastStatus, PlatformApi},
    tokio::{
        task::JoinHandle,
        time::{Instant, MissedTickBehavior},
    },
    tracing::{debug, error, info, warn},
};

/// Shortest accepted gap between two status checks.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// When a new poller performs its first status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstCheck {
    /// Right away. Used for sessions recovered at boot, whose broadcast may
    /// have ended while the process was down.
    Immediate,
    /// After one full interval. Used for sessions that just went live.
    AfterInterval,
}

/// Result of one status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    StillLive,
    /// Still live, and the platform id and title were just recorded.
    Backfilled,
    /// The session is closed; the poller stops.
    Closed,
}

/// Drives sessions from go-live to close.
///
/// Each live session gets one task that checks the broadcast status every
/// interval. The session is closed only on an explicit offline answer (or if
/// storage already shows it closed); failures are logged and the next tick
/// tries again.
pub struct SessionPoller {
    store: Store,
    api: Arc<dyn PlatformApi>,
    interval: Duration,
    /// Session ids with a running poll task.
    active: DashSet<i64>,
}

impl SessionPoller {
    /// A zero `interval` is raised to the minimum; the tick timer cannot
    /// run without a period.
    pub fn new(store: Store, api: Arc<dyn PlatformApi>, interval: Duration) -> Arc<Self> {
        if interval < MIN_POLL_INTERVAL {
            warn!(?interval, "poll interval too short, using the minimum");
        }
        Arc::new(Self {
            store,
            api,
            interval: interval.max(MIN_POLL_INTERVAL),
            active: DashSet::new(),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Go-live trigger: open a session for the owner of `api_key` and start
    /// polling it.
    pub async fn open_session(self: &Arc<Self>, api_key: &str) -> Result<Session> {
        let owner = self
            .store
            .find_stream_user_by_api_key(api_key)
            .await?
            .ok_or(Error::Unauthorized)?;

        let session = self.store.open_session(owner.id(), now_ms()).await?;
        info!(user = %owner.username(), session_id = session.id, "stream is live");

        self.spawn_poller(session.id, FirstCheck::AfterInterval);
        Ok(session)
    }

    /// Resume polling every session left open by a previous process.
    /// Returns how many pollers were started.
    pub async fn restart_open_sessions(self: &Arc<Self>) -> Result<usize> {
        let mut started = 0;
        for session in self.store.list_open_sessions().await? {
            if self.spawn_poller(session.id, FirstCheck::Immediate).is_some() {
                started += 1;
            }
        }
        if started > 0 {
            info!(count = started, "resumed polling of open sessions");
        }
        Ok(started)
    }

    /// Start the poll task for `session_id`. Returns `None` if one is already
    /// running in this process.
    pub fn spawn_poller(
        self: &Arc<Self>,
        session_id: i64,
        first: FirstCheck,
    ) -> Option<JoinHandle<()>> {
        if !self.active.insert(session_id) {
            debug!(session_id, "session is already being polled");
            return None;
        }
        let poller = Arc::clone(self);
        Some(tokio::spawn(async move {
            poller.poll_loop(session_id, first).await;
            poller.active.remove(&session_id);
        }))
    }

    pub fn is_polling(&self, session_id: i64) -> bool {
        self.active.contains(&session_id)
    }

    async fn poll_loop(&self, session_id: i64, first: FirstCheck) {
        let start = match first {
            FirstCheck::Immediate => Instant::now(),
            FirstCheck::AfterInterval => Instant::now() + self.interval,
        };
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.poll_once(session_id).await {
                Ok(PollOutcome::Closed) => break,
                Ok(_) => {},
                Err(e) if e.is_transient() => {
                    warn!(session_id, error = %e, "status check failed, will retry");
                },
                Err(e) => {
                    error!(session_id, error = %e, "status check failed");
                },
            }
        }
    }

    /// One status check of `session_id`, asked by the owner's platform id.
    pub async fn poll_once(&self, session_id: i64) -> Result<PollOutcome> {
        let Some(session) = self.store.find_session(session_id).await? else {
            warn!(session_id, "polled session no longer exists");
            return Ok(PollOutcome::Closed);
        };
        if !session.is_live() {
            return Ok(PollOutcome::Closed);
        }

        match self.api.broadcast_status(session.user_id).await? {
            BroadcastStatus::Offline => {
                if self.store.close_session(session_id, now_ms()).await? {
                    info!(user_id = session.user_id, session_id, "stream is offline, session closed");
                }
                Ok(PollOutcome::Closed)
            },
            BroadcastStatus::Live(stream) if session.needs_backfill() => {
                self.store
                    .backfill_session(session_id, &stream.id, &stream.title)
                    .await?;
                debug!(session_id, external_id = %stream.id, "session backfilled");
                Ok(PollOutcome::Backfilled)
            },
            BroadcastStatus::Live(_) => Ok(PollOutcome::StillLive),
        }
    }
}
