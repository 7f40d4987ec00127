//! User profile endpoints.

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use validator::Validate;

use crate::middleware::AuthContext;
use crate::response::Envelope;
use crate::router::Valid;
use crate::user::{User, UserRepository};
use crate::{AppState, ServerError};

/// `GET /api/users/me`.
pub async fn me(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<Envelope<User>>, ServerError> {
    let user = UserRepository::new(state.db.postgres.clone())
        .find_by_id(ctx.user_id)
        .await?;

    Ok(Envelope::success(user, "profile"))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
    #[validate(length(
        min = 1,
        max = 50,
        message = "Nickname must be between 1 and 50 characters."
    ))]
    nickname: Option<String>,
    #[validate(length(max = 500))]
    profile_image: Option<String>,
}

/// `PUT /api/users/me`: update nickname and/or profile image.
pub async fn update_me(
    State(state): State<AppState>,
    ctx: AuthContext,
    Valid(body): Valid<UpdateBody>,
) -> Result<Json<Envelope<User>>, ServerError> {
    let users = UserRepository::new(state.db.postgres.clone());

    // Taken nicknames are refused up front; the unique constraint still
    // backstops a concurrent claim of the same name.
    if let Some(nickname) = body.nickname.as_deref() {
        let current = users.find_by_id(ctx.user_id).await?;
        if nickname != current.nickname
            && users.exists_by_nickname(nickname).await?
        {
            return Err(ServerError::Invalid("nickname already in use"));
        }
    }

    let user = users
        .update_profile(
            ctx.user_id,
            body.nickname.as_deref(),
            body.profile_image.as_deref(),
        )
        .await?;

    Ok(Envelope::success(user, "profile updated"))
}

/// `GET /api/users/{user_id}`: another user's profile.
pub async fn get_one(
    State(state): State<AppState>,
    _ctx: AuthContext,
    Path(user_id): Path<i64>,
) -> Result<Json<Envelope<User>>, ServerError> {
    let user = UserRepository::new(state.db.postgres.clone())
        .find_by_id(user_id)
        .await?;

    Ok(Envelope::success(user, "profile"))
}

#[cfg(test)]
pub(super) mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    use crate::response::Envelope;
    use crate::router::auth::tests::body_of;
    use crate::user::User;
    use crate::*;

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_me_requires_authentication(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            None,
            app.clone(),
            Method::GET,
            "/api/users/me",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = make_request(
            Some(&state),
            app,
            Method::GET,
            "/api/users/me",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let envelope: Envelope<User> = body_of(response).await;
        assert_eq!(envelope.data.unwrap().nickname, "Alice");
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_update_nickname(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            Some(&state),
            app.clone(),
            Method::PUT,
            "/api/users/me",
            json!({"nickname": "Alicia"}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let envelope: Envelope<User> = body_of(response).await;
        assert_eq!(envelope.data.unwrap().nickname, "Alicia");

        // Bob's nickname is not available.
        let response = make_request(
            Some(&state),
            app,
            Method::PUT,
            "/api/users/me",
            json!({"nickname": "Bob"}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let envelope: Envelope<()> = body_of(response).await;
        assert_eq!(envelope.message, "nickname already in use");
    }

    #[sqlx::test(fixtures("../../fixtures/users.sql"))]
    async fn test_get_other_user(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let response = make_request(
            Some(&state),
            app,
            Method::GET,
            "/api/users/2",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let envelope: Envelope<User> = body_of(response).await;
        assert_eq!(envelope.data.unwrap().nickname, "Bob");
    }
}
