//! Handle database requests for users.

use sqlx::postgres::PgDatabaseError;
use sqlx::{Error as SQLxError, Pool, Postgres};

use crate::error::{Result, ServerError};
use crate::user::User;

const NICKNAME_UNIQUE_CONSTRAINT: &str = "users_nickname_key";

const SELECT_FIELDS: &str = r#"SELECT id, external_id, nickname, profile_image,
    created_at, updated_at FROM users"#;

/// Build the nth nickname candidate: `base`, `base1`, `base2`, ...
fn candidate_nickname(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_owned()
    } else {
        format!("{base}{attempt}")
    }
}

fn is_nickname_conflict(err: &SQLxError) -> bool {
    err.as_database_error()
        .and_then(|e| e.try_downcast_ref::<PgDatabaseError>())
        .and_then(|e| e.constraint())
        == Some(NICKNAME_UNIQUE_CONSTRAINT)
}

#[derive(Clone)]
pub struct UserRepository {
    pool: Pool<Postgres>,
}

impl UserRepository {
    /// Create a new [`UserRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Find a user using the `id` field.
    pub async fn find_by_id(&self, user_id: i64) -> Result<User> {
        sqlx::query_as::<_, User>(&format!("{SELECT_FIELDS} WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ServerError::NotFound("user"))
    }

    /// Find a user using the `external_id` field.
    pub async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>(&format!(
            "{SELECT_FIELDS} WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Whether a nickname is already taken.
    pub async fn exists_by_nickname(&self, nickname: &str) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM users WHERE nickname = $1)",
        )
        .bind(nickname)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Return the user behind an external identity, creating it on first
    /// login. Nickname collisions are resolved with a numeric suffix
    /// (`Alice`, `Alice1`, `Alice2`, ...); the unique constraint backstops
    /// the probe against concurrent first logins, in which case the insert
    /// is retried with the next suffix.
    pub async fn resolve_or_create(
        &self,
        external_id: &str,
        display_name: &str,
        profile_image: Option<&str>,
    ) -> Result<User> {
        if let Some(user) = self.find_by_external_id(external_id).await? {
            return Ok(user);
        }

        let mut attempt: u32 = 0;
        loop {
            let nickname = candidate_nickname(display_name, attempt);
            if self.exists_by_nickname(&nickname).await? {
                attempt += 1;
                continue;
            }

            match sqlx::query_as::<_, User>(
                r#"INSERT INTO users (external_id, nickname, profile_image)
                    VALUES ($1, $2, $3)
                    RETURNING id, external_id, nickname, profile_image,
                        created_at, updated_at"#,
            )
            .bind(external_id)
            .bind(&nickname)
            .bind(profile_image)
            .fetch_one(&self.pool)
            .await
            {
                Ok(user) => {
                    tracing::info!(
                        user_id = user.id,
                        nickname = user.nickname,
                        "new user created"
                    );
                    return Ok(user);
                },
                Err(err) if is_nickname_conflict(&err) => {
                    attempt += 1;
                },
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Update the mutable profile fields. `None` leaves a field untouched.
    pub async fn update_profile(
        &self,
        user_id: i64,
        nickname: Option<&str>,
        profile_image: Option<&str>,
    ) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"UPDATE users
                SET nickname = COALESCE($1, nickname),
                    profile_image = COALESCE($2, profile_image),
                    updated_at = NOW()
                WHERE id = $3
                RETURNING id, external_id, nickname, profile_image,
                    created_at, updated_at"#,
        )
        .bind(nickname)
        .bind(profile_image)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| {
            if is_nickname_conflict(&err) {
                ServerError::Invalid("nickname already in use")
            } else {
                err.into()
            }
        })?
        .ok_or(ServerError::NotFound("user"))
    }
}

#[cfg(test)]
mod tests {
    use sqlx::{Pool, Postgres};

    use super::*;

    #[test]
    fn test_candidate_nickname_sequence() {
        assert_eq!(candidate_nickname("Alice", 0), "Alice");
        assert_eq!(candidate_nickname("Alice", 1), "Alice1");
        assert_eq!(candidate_nickname("Alice", 2), "Alice2");
    }

    #[sqlx::test]
    async fn test_resolve_creates_then_reuses(pool: Pool<Postgres>) {
        let repo = UserRepository::new(pool);

        let created = repo
            .resolve_or_create("ext-100", "Alice", Some("https://img/a.png"))
            .await
            .expect("create");
        assert_eq!(created.nickname, "Alice");

        let resolved = repo
            .resolve_or_create("ext-100", "Alice", None)
            .await
            .expect("resolve");
        assert_eq!(resolved.id, created.id);
    }

    #[sqlx::test]
    async fn test_nickname_collisions_get_suffixes(pool: Pool<Postgres>) {
        let repo = UserRepository::new(pool);

        let first = repo
            .resolve_or_create("ext-1", "Alice", None)
            .await
            .expect("first");
        let second = repo
            .resolve_or_create("ext-2", "Alice", None)
            .await
            .expect("second");
        let third = repo
            .resolve_or_create("ext-3", "Alice", None)
            .await
            .expect("third");

        assert_eq!(first.nickname, "Alice");
        assert_eq!(second.nickname, "Alice1");
        assert_eq!(third.nickname, "Alice2");
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_update_profile_rejects_taken_nickname(pool: Pool<Postgres>) {
        let repo = UserRepository::new(pool);

        // Fixture user 2 is "Bob"; user 1 already owns "Alice".
        let result = repo.update_profile(2, Some("Alice"), None).await;
        assert!(matches!(result, Err(ServerError::Invalid(_))));

        let updated = repo
            .update_profile(2, Some("Bobby"), None)
            .await
            .expect("update");
        assert_eq!(updated.nickname, "Bobby");
    }
}
