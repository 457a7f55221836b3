//! SQLite persistence for users, channel configs, sessions, questions and
//! first-race exclusions.
//!
//! Every lifecycle transition that can race is a single conditional write:
//! opening a session, closing it, claiming "first" and pinning a question.
//! Callers learn from the returned flag whether their write took effect.

pub mod exclusions;
pub mod models;
pub mod questions;
pub mod sessions;
pub mod users;

use std::{str::FromStr, time::Duration};

use {
    soulxbot_common::Result,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    },
};

pub use models::{
    EncryptedCredentials, Exclusion, FeatureFlags, FirstLeader, Question, Session, SessionState,
    StreamConfig, StreamUser, User,
};

/// Handle to the bot database. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `url` and ensure the schema.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        Self::init(&pool).await?;
        tracing::debug!(url, "database ready");
        Ok(Self::new(pool))
    }

    /// Single-connection in-memory database. The connection is never
    /// recycled, since that would drop the data with it.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::init(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create all tables and indexes if they don't exist.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS user (
                id           INTEGER PRIMARY KEY,
                username     TEXT NOT NULL,
                display_name TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS user_username ON user(username)")
            .execute(pool)
            .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS stream_config (
                user_id       INTEGER PRIMARY KEY REFERENCES user(id),
                api_key       TEXT NOT NULL UNIQUE,
                bot_disabled  INTEGER NOT NULL DEFAULT 0,
                first_enabled INTEGER NOT NULL DEFAULT 1,
                qotd_enabled  INTEGER NOT NULL DEFAULT 1,
                first_epoch   INTEGER NOT NULL DEFAULT 0,
                date_updated  INTEGER NOT NULL,
                access_token  BLOB,
                refresh_token BLOB
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS question (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                text        TEXT NOT NULL UNIQUE,
                disabled    INTEGER NOT NULL DEFAULT 0,
                skip_count  INTEGER NOT NULL DEFAULT 0
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS session (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id       INTEGER NOT NULL REFERENCES user(id),
                external_id   TEXT,
                title         TEXT,
                started_at    INTEGER NOT NULL,
                ended_at      INTEGER,
                first_user_id INTEGER REFERENCES user(id),
                qotd_id       INTEGER REFERENCES question(id)
            )"#,
        )
        .execute(pool)
        .await?;
        // At most one open session per broadcaster.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS session_one_open ON session(user_id) WHERE ended_at IS NULL",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS exclusion (
                id       INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id INTEGER REFERENCES user(id),
                username TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        Store::init(store.pool()).await.unwrap();
        Store::init(store.pool()).await.unwrap();
    }

    #[tokio::test]
    async fn file_database_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("bot.db").display());

        {
            let store = Store::connect(&url, 2).await.unwrap();
            store.upsert_user(7, "viewer", "Viewer").await.unwrap();
        }

        let store = Store::connect(&url, 2).await.unwrap();
        let user = store.find_user(7).await.unwrap().unwrap();
        assert_eq!(user.display_name, "Viewer");
    }
}
