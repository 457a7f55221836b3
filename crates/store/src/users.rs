use {
    soulxbot_common::{Error, Result},
    tracing::debug,
};

use crate::{
    Store,
    models::{EncryptedCredentials, FeatureFlags, StreamConfig, StreamUser, User},
};

#[derive(sqlx::FromRow)]
struct StreamUserRow {
    id: i64,
    username: String,
    display_name: String,
    api_key: String,
    bot_disabled: i32,
    first_enabled: i32,
    qotd_enabled: i32,
    first_epoch: i64,
    date_updated: i64,
    access_token: Option<Vec<u8>>,
    refresh_token: Option<Vec<u8>>,
}

impl From<StreamUserRow> for StreamUser {
    fn from(r: StreamUserRow) -> Self {
        let credentials = r.access_token.map(|access_token| EncryptedCredentials {
            access_token,
            refresh_token: r.refresh_token,
        });
        Self {
            user: User {
                id: r.id,
                username: r.username,
                display_name: r.display_name,
            },
            config: StreamConfig {
                user_id: r.id,
                api_key: r.api_key,
                flags: FeatureFlags {
                    first_enabled: r.first_enabled != 0,
                    qotd_enabled: r.qotd_enabled != 0,
                    bot_disabled: r.bot_disabled != 0,
                },
                first_epoch: r.first_epoch,
                date_updated: r.date_updated,
                credentials,
            },
        }
    }
}

const STREAM_USER_SELECT: &str = r#"SELECT u.id, u.username, u.display_name,
        c.api_key, c.bot_disabled, c.first_enabled, c.qotd_enabled,
        c.first_epoch, c.date_updated, c.access_token, c.refresh_token
    FROM stream_config c JOIN user u ON u.id = c.user_id"#;

impl Store {
    /// Insert a chat user or refresh their names. Usernames are stored
    /// lowercase; the display name keeps the platform's casing.
    pub async fn upsert_user(&self, id: i64, username: &str, display_name: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"INSERT INTO user (id, username, display_name) VALUES (?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 username = excluded.username,
                 display_name = excluded.display_name
               RETURNING id, username, display_name"#,
        )
        .bind(id)
        .bind(username.to_lowercase())
        .bind(display_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn find_user(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT id, username, display_name FROM user WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, display_name FROM user WHERE username = ?",
        )
        .bind(username.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Create the channel config for `user_id` or, on re-registration,
    /// rotate its api key. Stored credentials are replaced only when new
    /// ones are supplied.
    pub async fn register_stream_user(
        &self,
        user_id: i64,
        api_key: &str,
        credentials: Option<&EncryptedCredentials>,
        now: i64,
    ) -> Result<StreamUser> {
        let (access, refresh) = match credentials {
            Some(c) => (Some(c.access_token.as_slice()), c.refresh_token.as_deref()),
            None => (None, None),
        };
        sqlx::query(
            r#"INSERT INTO stream_config
                 (user_id, api_key, first_epoch, date_updated, access_token, refresh_token)
               VALUES (?, ?, 0, ?, ?, ?)
               ON CONFLICT(user_id) DO UPDATE SET
                 api_key = excluded.api_key,
                 date_updated = excluded.date_updated,
                 access_token = COALESCE(excluded.access_token, stream_config.access_token),
                 refresh_token = CASE WHEN excluded.access_token IS NULL
                                      THEN stream_config.refresh_token
                                      ELSE excluded.refresh_token END"#,
        )
        .bind(user_id)
        .bind(api_key)
        .bind(now)
        .bind(access)
        .bind(refresh)
        .execute(&self.pool)
        .await?;
        debug!(user_id, "stream user registered");

        self.find_stream_user(user_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("stream user {user_id}")))
    }

    pub async fn find_stream_user(&self, user_id: i64) -> Result<Option<StreamUser>> {
        let row = sqlx::query_as::<_, StreamUserRow>(&format!("{STREAM_USER_SELECT} WHERE c.user_id = ?"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn find_stream_user_by_api_key(&self, api_key: &str) -> Result<Option<StreamUser>> {
        let row = sqlx::query_as::<_, StreamUserRow>(&format!("{STREAM_USER_SELECT} WHERE c.api_key = ?"))
            .bind(api_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn find_stream_user_by_username(&self, username: &str) -> Result<Option<StreamUser>> {
        let row = sqlx::query_as::<_, StreamUserRow>(&format!("{STREAM_USER_SELECT} WHERE u.username = ?"))
            .bind(username.to_lowercase())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_stream_users(&self) -> Result<Vec<StreamUser>> {
        let rows = sqlx::query_as::<_, StreamUserRow>(&format!("{STREAM_USER_SELECT} ORDER BY u.username"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Sealed credentials of `user_id`, if any were ever stored.
    pub async fn credentials(&self, user_id: i64) -> Result<Option<EncryptedCredentials>> {
        Ok(self
            .find_stream_user(user_id)
            .await?
            .and_then(|u| u.config.credentials))
    }

    /// Replace the sealed credential pair of `user_id`.
    pub async fn update_credentials(
        &self,
        user_id: i64,
        credentials: &EncryptedCredentials,
        now: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE stream_config SET access_token = ?, refresh_token = ?, date_updated = ? WHERE user_id = ?",
        )
        .bind(&credentials.access_token)
        .bind(&credentials.refresh_token)
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("stream user {user_id}")));
        }
        Ok(())
    }

    pub async fn set_flags(&self, user_id: i64, flags: FeatureFlags, now: i64) -> Result<()> {
        sqlx::query(
            r#"UPDATE stream_config
               SET first_enabled = ?, qotd_enabled = ?, bot_disabled = ?, date_updated = ?
               WHERE user_id = ?"#,
        )
        .bind(flags.first_enabled as i32)
        .bind(flags.qotd_enabled as i32)
        .bind(flags.bot_disabled as i32)
        .bind(now)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Start a new "first" season: counts from before `epoch` are ignored
    /// by the default leaderboard.
    pub async fn reset_first_epoch(&self, user_id: i64, epoch: i64) -> Result<()> {
        sqlx::query("UPDATE stream_config SET first_epoch = ?, date_updated = ? WHERE user_id = ?")
            .bind(epoch)
            .bind(epoch)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::test_support::*};

    fn creds(access: u8, refresh: Option<u8>) -> EncryptedCredentials {
        EncryptedCredentials {
            access_token: vec![access; 40],
            refresh_token: refresh.map(|r| vec![r; 40]),
        }
    }

    #[tokio::test]
    async fn upsert_refreshes_names_and_lowercases() {
        let store = store().await;
        store.upsert_user(5, "Viewer", "Viewer").await.unwrap();
        let user = store.upsert_user(5, "NewName", "NewName").await.unwrap();
        assert_eq!(user.username, "newname");
        assert_eq!(user.display_name, "NewName");

        let found = store.find_user_by_username("NEWNAME").await.unwrap().unwrap();
        assert_eq!(found.id, 5);
        assert!(store.find_user_by_username("viewer").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stream_user_lookups() {
        let (store, owner) = store_with_owner().await;
        assert_eq!(owner.username(), "streamer");
        assert!(owner.first_enabled());
        assert!(!owner.bot_disabled());
        assert!(owner.config.credentials.is_none());

        let by_key = store.find_stream_user_by_api_key("key-1").await.unwrap().unwrap();
        assert_eq!(by_key.id(), 1);
        let by_name = store.find_stream_user_by_username("Streamer").await.unwrap().unwrap();
        assert_eq!(by_name.id(), 1);
        assert!(store.find_stream_user_by_api_key("nope").await.unwrap().is_none());
        assert_eq!(store.list_stream_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn re_registration_rotates_key_and_keeps_credentials() {
        let (store, _) = store_with_owner().await;
        store.update_credentials(1, &creds(1, Some(2)), 10).await.unwrap();

        let again = store.register_stream_user(1, "key-2", None, 20).await.unwrap();
        assert_eq!(again.config.api_key, "key-2");
        assert_eq!(again.config.credentials, Some(creds(1, Some(2))));
        assert!(store.find_stream_user_by_api_key("key-1").await.unwrap().is_none());

        let replaced = store
            .register_stream_user(1, "key-3", Some(&creds(3, None)), 30)
            .await
            .unwrap();
        assert_eq!(replaced.config.credentials, Some(creds(3, None)));
    }

    #[tokio::test]
    async fn duplicate_api_key_is_a_conflict() {
        let (store, _) = store_with_owner().await;
        store.upsert_user(2, "other", "Other").await.unwrap();
        let err = store.register_stream_user(2, "key-1", None, 0).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn update_credentials_requires_registration() {
        let store = store().await;
        let err = store.update_credentials(9, &creds(1, None), 0).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn flags_and_epoch_round_trip() {
        let (store, _) = store_with_owner().await;
        let flags = FeatureFlags {
            first_enabled: false,
            qotd_enabled: true,
            bot_disabled: true,
        };
        store.set_flags(1, flags, 5).await.unwrap();
        store.reset_first_epoch(1, 1_000).await.unwrap();

        let owner = store.find_stream_user(1).await.unwrap().unwrap();
        assert_eq!(owner.config.flags, flags);
        assert_eq!(owner.config.first_epoch, 1_000);
    }
}
