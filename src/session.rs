//! Refresh-token persistence.
//!
//! Pure key-value storage over `refresh_tokens`: the codec knows nothing
//! about this store and the store never inspects token contents.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Postgres};

use crate::error::{Result, ServerError};

/// Refresh token as saved on database.
#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Handle refresh-token rows.
#[derive(Clone)]
pub struct SessionStore {
    pool: Pool<Postgres>,
}

impl SessionStore {
    /// Create a new [`SessionStore`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Persist a new refresh token for a user.
    pub async fn save(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO refresh_tokens (user_id, token, expires_at)
                VALUES ($1, $2, $3)"#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Find a record by its opaque token value.
    pub async fn find_by_value(&self, token: &str) -> Result<RefreshTokenRecord> {
        sqlx::query_as::<_, RefreshTokenRecord>(
            r#"SELECT id, user_id, token, expires_at, created_at
                FROM refresh_tokens WHERE token = $1"#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ServerError::TokenNotFound)
    }

    /// Delete one record by its token value.
    pub async fn delete_by_value(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Delete every refresh token a user owns, across all devices.
    pub async fn delete_all_for_user(&self, user_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Bulk-delete all records expired before `now`. Invoked out-of-band by
    /// an external batch job, never by the request path.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
                .bind(now)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() > 0 {
            tracing::info!(swept = result.rows_affected(), "expired refresh tokens removed");
        }

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use sqlx::{Pool, Postgres};

    use super::*;

    #[sqlx::test(fixtures("../fixtures/users.sql"))]
    async fn test_save_find_delete(pool: Pool<Postgres>) {
        let store = SessionStore::new(pool);
        let expires_at = Utc::now() + Duration::days(14);

        store.save(1, "opaque-value", expires_at).await.expect("save");

        let record = store.find_by_value("opaque-value").await.expect("find");
        assert_eq!(record.user_id, 1);
        assert_eq!(record.token, "opaque-value");

        store.delete_by_value("opaque-value").await.expect("delete");
        assert!(matches!(
            store.find_by_value("opaque-value").await,
            Err(ServerError::TokenNotFound)
        ));
    }

    #[sqlx::test(fixtures("../fixtures/users.sql"))]
    async fn test_delete_all_for_user_spares_others(pool: Pool<Postgres>) {
        let store = SessionStore::new(pool);
        let expires_at = Utc::now() + Duration::days(14);

        store.save(1, "device-a", expires_at).await.expect("save");
        store.save(1, "device-b", expires_at).await.expect("save");
        store.save(2, "other-user", expires_at).await.expect("save");

        let removed = store.delete_all_for_user(1).await.expect("delete all");
        assert_eq!(removed, 2);

        assert!(store.find_by_value("device-a").await.is_err());
        assert!(store.find_by_value("other-user").await.is_ok());
    }

    #[sqlx::test(fixtures("../fixtures/users.sql"))]
    async fn test_sweep_only_removes_expired(pool: Pool<Postgres>) {
        let store = SessionStore::new(pool);
        let now = Utc::now();

        store.save(1, "stale", now - Duration::seconds(1)).await.expect("save");
        store.save(1, "fresh", now + Duration::days(1)).await.expect("save");

        let swept = store.sweep_expired(now).await.expect("sweep");
        assert_eq!(swept, 1);

        assert!(store.find_by_value("stale").await.is_err());
        assert!(store.find_by_value("fresh").await.is_ok());
    }
}
