use {
    soulxbot_common::{Error, Result},
    tracing::debug,
};

use crate::{
    Store,
    models::{FirstLeader, Session, User},
};

const SESSION_COLUMNS: &str =
    "id, user_id, external_id, title, started_at, ended_at, first_user_id, qotd_id";

#[derive(sqlx::FromRow)]
struct LeaderRow {
    id: i64,
    username: String,
    display_name: String,
    times_first: i64,
}

impl Store {
    /// Insert a live session for `user_id` unless one is already open.
    ///
    /// The existence check and the insert are one statement; the partial
    /// unique index backs it up. Either way a concurrent opener gets
    /// [`Error::Conflict`].
    pub async fn open_session(&self, user_id: i64, now: i64) -> Result<Session> {
        let session = sqlx::query_as::<_, Session>(&format!(
            r#"INSERT INTO session (user_id, started_at)
               SELECT ?, ?
               WHERE NOT EXISTS (SELECT 1 FROM session WHERE user_id = ? AND ended_at IS NULL)
               RETURNING {SESSION_COLUMNS}"#
        ))
        .bind(user_id)
        .bind(now)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match session {
            Some(session) => {
                debug!(user_id, session_id = session.id, "session opened");
                Ok(session)
            },
            None => Err(Error::conflict(format!("user {user_id} already has an open session"))),
        }
    }

    pub async fn find_session(&self, id: i64) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// The open session of `user_id`, if the broadcaster is live.
    pub async fn find_open_session(&self, user_id: i64) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session WHERE user_id = ? AND ended_at IS NULL"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    pub async fn list_open_sessions(&self) -> Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM session WHERE ended_at IS NULL ORDER BY started_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    /// Set the end time. Returns `false` if the session was already closed.
    pub async fn close_session(&self, id: i64, now: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE session SET ended_at = ? WHERE id = ? AND ended_at IS NULL")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Fill in the platform identifier and title. Fields that are already
    /// set are left alone.
    pub async fn backfill_session(&self, id: i64, external_id: &str, title: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE session
               SET external_id = COALESCE(external_id, ?), title = COALESCE(title, ?)
               WHERE id = ? AND (external_id IS NULL OR title IS NULL)"#,
        )
        .bind(external_id)
        .bind(title)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record `user_id` as the first chatter of a live session.
    ///
    /// Returns `true` only for the caller whose write won.
    pub async fn claim_first(&self, session_id: i64, user_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE session SET first_user_id = ?
               WHERE id = ? AND first_user_id IS NULL AND ended_at IS NULL"#,
        )
        .bind(user_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Owner override of the first chatter. Only applies to live sessions.
    pub async fn give_first(&self, session_id: i64, user_id: i64) -> Result<bool> {
        let result =
            sqlx::query("UPDATE session SET first_user_id = ? WHERE id = ? AND ended_at IS NULL")
                .bind(user_id)
                .bind(session_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Pin a question to the session unless one is pinned already.
    pub async fn pin_question(&self, session_id: i64, question_id: i64) -> Result<bool> {
        let result =
            sqlx::query("UPDATE session SET qotd_id = ? WHERE id = ? AND qotd_id IS NULL")
                .bind(question_id)
                .bind(session_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Unpin `question_id`. A no-op if another question is pinned by now.
    pub async fn unpin_question(&self, session_id: i64, question_id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE session SET qotd_id = NULL WHERE id = ? AND qotd_id = ?")
            .bind(session_id)
            .bind(question_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// How many sessions of `owner_id` started at or after `since` were won
    /// by `user_id`.
    pub async fn times_first(&self, owner_id: i64, user_id: i64, since: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(id) FROM session
               WHERE user_id = ? AND first_user_id = ? AND started_at >= ?"#,
        )
        .bind(owner_id)
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Top `limit` first chatters of `owner_id` since `since`. Ties go to
    /// whoever reached the count earliest.
    pub async fn first_leaders(
        &self,
        owner_id: i64,
        since: i64,
        limit: u32,
    ) -> Result<Vec<FirstLeader>> {
        let rows = sqlx::query_as::<_, LeaderRow>(
            r#"SELECT u.id, u.username, u.display_name, COUNT(s.id) AS times_first
               FROM session s JOIN user u ON u.id = s.first_user_id
               WHERE s.user_id = ? AND s.started_at >= ?
               GROUP BY u.id
               ORDER BY times_first DESC, MAX(s.started_at) ASC
               LIMIT ?"#,
        )
        .bind(owner_id)
        .bind(since)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| FirstLeader {
                user: User {
                    id: r.id,
                    username: r.username,
                    display_name: r.display_name,
                },
                times_first: r.times_first,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::test_support::*, futures::future::join_all};

    #[tokio::test]
    async fn second_open_is_a_conflict() {
        let (store, owner) = store_with_owner().await;
        let first = store.open_session(owner.id(), 100).await.unwrap();
        assert!(first.is_live());

        let err = store.open_session(owner.id(), 200).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(store.list_open_sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reopen_after_close() {
        let (store, owner) = store_with_owner().await;
        let first = store.open_session(owner.id(), 100).await.unwrap();
        assert!(store.close_session(first.id, 150).await.unwrap());
        assert!(!store.close_session(first.id, 160).await.unwrap());

        let closed = store.find_session(first.id).await.unwrap().unwrap();
        assert_eq!(closed.ended_at, Some(150));

        let second = store.open_session(owner.id(), 200).await.unwrap();
        assert_ne!(second.id, first.id);
        let open = store.find_open_session(owner.id()).await.unwrap().unwrap();
        assert_eq!(open.id, second.id);
    }

    #[tokio::test]
    async fn concurrent_opens_leave_one_session() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("race.db").display());
        let store = Store::connect(&url, 4).await.unwrap();
        store.upsert_user(1, "streamer", "Streamer").await.unwrap();
        store.register_stream_user(1, "key", None, 0).await.unwrap();

        let attempts = (0..8).map(|i| {
            let store = store.clone();
            async move { store.open_session(1, i).await }
        });
        let results = join_all(attempts).await;

        let opened = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(opened, 1);
        for r in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(r, Error::Conflict(_)), "unexpected error: {r}");
        }
        assert_eq!(store.list_open_sessions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn backfill_happens_once() {
        let (store, owner) = store_with_owner().await;
        let session = store.open_session(owner.id(), 1).await.unwrap();

        assert!(store.backfill_session(session.id, "s-1", "Hello").await.unwrap());
        assert!(!store.backfill_session(session.id, "s-2", "Other").await.unwrap());

        let session = store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(session.external_id.as_deref(), Some("s-1"));
        assert_eq!(session.title.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn only_one_claim_wins() {
        let (store, owner) = store_with_owner().await;
        store.upsert_user(2, "alice", "Alice").await.unwrap();
        store.upsert_user(3, "bob", "Bob").await.unwrap();
        let session = store.open_session(owner.id(), 1).await.unwrap();

        assert!(store.claim_first(session.id, 2).await.unwrap());
        assert!(!store.claim_first(session.id, 3).await.unwrap());

        let session = store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(session.first_user_id, Some(2));
    }

    #[tokio::test]
    async fn closed_sessions_cannot_be_claimed_or_given() {
        let (store, owner) = store_with_owner().await;
        store.upsert_user(2, "alice", "Alice").await.unwrap();
        let session = store.open_session(owner.id(), 1).await.unwrap();
        store.close_session(session.id, 2).await.unwrap();

        assert!(!store.claim_first(session.id, 2).await.unwrap());
        assert!(!store.give_first(session.id, 2).await.unwrap());
    }

    #[tokio::test]
    async fn give_first_overrides_winner() {
        let (store, owner) = store_with_owner().await;
        store.upsert_user(2, "alice", "Alice").await.unwrap();
        store.upsert_user(3, "bob", "Bob").await.unwrap();
        let session = store.open_session(owner.id(), 1).await.unwrap();
        store.claim_first(session.id, 2).await.unwrap();

        assert!(store.give_first(session.id, 3).await.unwrap());
        let session = store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(session.first_user_id, Some(3));
    }

    #[tokio::test]
    async fn counts_and_leaders_respect_epoch() {
        let (store, owner) = store_with_owner().await;
        store.upsert_user(2, "alice", "Alice").await.unwrap();
        store.upsert_user(3, "bob", "Bob").await.unwrap();

        // alice wins at t=10 and t=20, bob at t=30
        for (t, winner) in [(10, 2), (20, 2), (30, 3)] {
            let s = store.open_session(owner.id(), t).await.unwrap();
            store.claim_first(s.id, winner).await.unwrap();
            store.close_session(s.id, t + 1).await.unwrap();
        }

        assert_eq!(store.times_first(owner.id(), 2, 0).await.unwrap(), 2);
        assert_eq!(store.times_first(owner.id(), 2, 15).await.unwrap(), 1);
        assert_eq!(store.times_first(owner.id(), 3, 0).await.unwrap(), 1);

        let leaders = store.first_leaders(owner.id(), 0, 3).await.unwrap();
        let names: Vec<_> = leaders.iter().map(|l| l.user.display_name.as_str()).collect();
        assert_eq!(names, ["Alice", "Bob"]);
        assert_eq!(leaders[0].times_first, 2);

        let recent = store.first_leaders(owner.id(), 25, 3).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].user.id, 3);
    }

    #[tokio::test]
    async fn question_pin_is_conditional() {
        let (store, owner) = store_with_owner().await;
        let q1 = store.create_question("One?").await.unwrap();
        let q2 = store.create_question("Two?").await.unwrap();
        let session = store.open_session(owner.id(), 1).await.unwrap();

        assert!(store.pin_question(session.id, q1.id).await.unwrap());
        assert!(!store.pin_question(session.id, q2.id).await.unwrap());
        assert!(!store.unpin_question(session.id, q2.id).await.unwrap());
        assert!(store.unpin_question(session.id, q1.id).await.unwrap());
        assert!(store.pin_question(session.id, q2.id).await.unwrap());
    }
}
