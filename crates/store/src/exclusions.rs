use soulxbot_common::Result;

use crate::{Store, models::Exclusion};

#[derive(sqlx::FromRow)]
struct ExclusionRow {
    id: i64,
    owner_id: Option<i64>,
    username: String,
}

impl Store {
    /// Bar `username` from the first race, for one owner or (with `None`)
    /// for every channel. Returns `false` if the entry already existed.
    pub async fn add_exclusion(&self, owner_id: Option<i64>, username: &str) -> Result<bool> {
        let username = username.trim().to_lowercase();
        let result = sqlx::query(
            r#"INSERT INTO exclusion (owner_id, username)
               SELECT ?, ?
               WHERE NOT EXISTS (
                 SELECT 1 FROM exclusion WHERE owner_id IS ? AND username = ?
               )"#,
        )
        .bind(owner_id)
        .bind(&username)
        .bind(owner_id)
        .bind(&username)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Whether `username` is excluded in `owner_id`'s channel, either by an
    /// owner entry or a global one.
    pub async fn is_excluded(&self, owner_id: i64, username: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM exclusion
               WHERE (owner_id = ? OR owner_id IS NULL) AND username = ?"#,
        )
        .bind(owner_id)
        .bind(username.to_lowercase())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn list_exclusions(&self, owner_id: Option<i64>) -> Result<Vec<Exclusion>> {
        let rows = sqlx::query_as::<_, ExclusionRow>(
            "SELECT id, owner_id, username FROM exclusion WHERE owner_id IS ? ORDER BY username",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| Exclusion {
                id: r.id,
                owner_id: r.owner_id,
                username: r.username,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::test_support::*};

    #[tokio::test]
    async fn owner_and_global_scopes() {
        let (store, owner) = store_with_owner().await;
        store.upsert_user(2, "other", "Other").await.unwrap();
        store.register_stream_user(2, "key-2", None, 0).await.unwrap();

        assert!(store.add_exclusion(None, "SoulxBot").await.unwrap());
        assert!(store.add_exclusion(Some(owner.id()), "Nightbot").await.unwrap());

        assert!(store.is_excluded(owner.id(), "soulxbot").await.unwrap());
        assert!(store.is_excluded(2, "SOULXBOT").await.unwrap());
        assert!(store.is_excluded(owner.id(), "nightbot").await.unwrap());
        assert!(!store.is_excluded(2, "nightbot").await.unwrap());
        assert!(!store.is_excluded(owner.id(), "viewer").await.unwrap());
    }

    #[tokio::test]
    async fn duplicates_are_ignored_per_scope() {
        let (store, owner) = store_with_owner().await;
        assert!(store.add_exclusion(None, "bot").await.unwrap());
        assert!(!store.add_exclusion(None, "BOT").await.unwrap());
        assert!(store.add_exclusion(Some(owner.id()), "bot").await.unwrap());

        assert_eq!(store.list_exclusions(None).await.unwrap().len(), 1);
        let scoped = store.list_exclusions(Some(owner.id())).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].owner_id, Some(owner.id()));
    }
}
