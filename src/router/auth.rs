//! Login, token refresh and logout endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde::Deserialize;
use validator::Validate;

use crate::auth::SessionTokens;
use crate::response::Envelope;
use crate::router::Valid;
use crate::{AppState, ServerError};

const BEARER: &str = "Bearer ";

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: String,
}

/// `GET /api/auth/{provider}/callback`: authorization-code login.
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<Envelope<SessionTokens>>, ServerError> {
    let configured = state
        .oauth
        .as_ref()
        .map(|oauth| oauth.provider().to_owned())
        .unwrap_or_default();
    if provider != configured {
        return Err(ServerError::NotFound("identity provider"));
    }

    let tokens = state.auth().login(&query.code).await?;
    Ok(Envelope::success(tokens, "login successful"))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshBody {
    #[validate(length(min = 1, message = "refreshToken must not be empty."))]
    refresh_token: String,
}

/// `POST /api/auth/refresh`: rotate a refresh token.
pub async fn refresh(
    State(state): State<AppState>,
    Valid(body): Valid<RefreshBody>,
) -> Result<Json<Envelope<SessionTokens>>, ServerError> {
    let tokens = state.auth().refresh(&body.refresh_token).await?;
    Ok(Envelope::success(tokens, "token refreshed"))
}

/// `POST /api/auth/logout`: drop every session of the presented user.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Envelope<()>>, ServerError> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or(ServerError::Unauthorized)?;

    state.auth().logout(bearer).await?;
    Ok(Envelope::success((), "logged out"))
}

/// `GET /api/auth/validate`: check the presented access token.
pub async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Envelope<bool>>, ServerError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix(BEARER))
        .ok_or(ServerError::Unauthorized)?;

    if state.token.validate(token) {
        Ok(Envelope::success(true, "token is valid"))
    } else {
        Err(ServerError::InvalidToken)
    }
}

/// `POST /api/auth/dev-login`: fixture-account login, config-gated.
pub async fn dev_login(
    State(state): State<AppState>,
) -> Result<Json<Envelope<SessionTokens>>, ServerError> {
    let tokens = state.auth().dev_login().await?;
    Ok(Envelope::success(tokens, "development login successful"))
}

#[cfg(test)]
pub(super) mod tests {
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use serde_json::json;
    use sqlx::{Pool, Postgres};

    use crate::response::Envelope;
    use crate::*;

    #[derive(Debug, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TokenPair {
        pub access_token: String,
        pub refresh_token: String,
    }

    pub async fn body_of<T: serde::de::DeserializeOwned>(
        response: axum::http::Response<axum::body::Body>,
    ) -> Envelope<T> {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Log in through the fixture account and return the issued pair.
    pub async fn dev_login(app: Router) -> TokenPair {
        let response = make_request(
            None,
            app,
            Method::POST,
            "/api/auth/dev-login",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let envelope: Envelope<TokenPair> = body_of(response).await;
        envelope.data.unwrap()
    }

    #[sqlx::test]
    async fn test_refresh_rotates_the_stored_token(pool: Pool<Postgres>) {
        let state = router::state(pool.clone());
        let app = app(state.clone());

        let pair = dev_login(app.clone()).await;

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/api/auth/refresh",
            json!({"refreshToken": pair.refresh_token}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let envelope: Envelope<TokenPair> = body_of(response).await;
        let rotated = envelope.data.unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        // The old value must be gone from the store.
        let response = make_request(
            None,
            app,
            Method::POST,
            "/api/auth/refresh",
            json!({"refreshToken": pair.refresh_token}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let envelope: Envelope<()> = body_of(response).await;
        assert_eq!(envelope.message, "refresh token not found");
    }

    #[sqlx::test]
    async fn test_refresh_rejects_garbage(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state);

        let response = make_request(
            None,
            app,
            Method::POST,
            "/api/auth/refresh",
            json!({"refreshToken": "not-a-jwt"}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let envelope: Envelope<()> = body_of(response).await;
        assert_eq!(envelope.message, "invalid or expired credential");
    }

    #[sqlx::test]
    async fn test_refresh_with_stale_stored_expiry(pool: Pool<Postgres>) {
        let state = router::state(pool.clone());
        let app = app(state.clone());

        let pair = dev_login(app.clone()).await;

        // The codec still accepts the token; only the stored record is stale.
        sqlx::query(
            "UPDATE refresh_tokens SET expires_at = NOW() - INTERVAL '1 second'
                WHERE token = $1",
        )
        .bind(&pair.refresh_token)
        .execute(&pool)
        .await
        .unwrap();

        let response = make_request(
            None,
            app.clone(),
            Method::POST,
            "/api/auth/refresh",
            json!({"refreshToken": pair.refresh_token}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let envelope: Envelope<()> = body_of(response).await;
        assert_eq!(envelope.message, "refresh token expired");

        // The stale record was deleted on the way out.
        let response = make_request(
            None,
            app,
            Method::POST,
            "/api/auth/refresh",
            json!({"refreshToken": pair.refresh_token}).to_string(),
        )
        .await;
        let envelope: Envelope<()> = body_of(response).await;
        assert_eq!(envelope.message, "refresh token not found");
    }

    #[sqlx::test]
    async fn test_logout_drops_every_session(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        // Two devices, two refresh tokens.
        let first = dev_login(app.clone()).await;
        let second = dev_login(app.clone()).await;

        let response = crate::make_request_with_token(
            app.clone(),
            Method::POST,
            "/api/auth/logout",
            String::default(),
            &format!("Bearer {}", first.access_token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        for stale in [first.refresh_token, second.refresh_token] {
            let response = make_request(
                None,
                app.clone(),
                Method::POST,
                "/api/auth/refresh",
                json!({"refreshToken": stale}).to_string(),
            )
            .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            let envelope: Envelope<()> = body_of(response).await;
            assert_eq!(envelope.message, "refresh token not found");
        }
    }

    #[sqlx::test]
    async fn test_validate_endpoint(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state.clone());

        let pair = dev_login(app.clone()).await;

        let response = crate::make_request_with_token(
            app.clone(),
            Method::GET,
            "/api/auth/validate",
            String::default(),
            &format!("Bearer {}", pair.access_token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let envelope: Envelope<bool> = body_of(response).await;
        assert_eq!(envelope.data, Some(true));

        let response = crate::make_request_with_token(
            app,
            Method::GET,
            "/api/auth/validate",
            String::default(),
            "Bearer garbage",
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    async fn test_login_fails_closed_on_upstream_error(pool: Pool<Postgres>) {
        // A provider whose token endpoint always answers 500.
        let provider = Router::new().route(
            "/oauth/token",
            axum::routing::post(|| async {
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }),
        );
        let listener =
            tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, provider).await.unwrap();
        });

        let mut state = router::state(pool.clone());
        state.oauth = Some(
            oauth::OAuthClient::new(config::OAuthProvider {
                provider: "kakao".to_owned(),
                client_id: "id".to_owned(),
                client_secret: "secret".to_owned(),
                redirect_uri: "https://litcircle.test/callback".to_owned(),
                token_endpoint: format!("http://{addr}/oauth/token"),
                profile_endpoint: format!("http://{addr}/v2/user/me"),
                timeout: Some(2),
            })
            .unwrap(),
        );
        let app = app(state);

        let response = make_request(
            None,
            app,
            Method::GET,
            "/api/auth/kakao/callback?code=abc",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        // Nothing was created on the failed path.
        let (users,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM users")
                .fetch_one(&pool)
                .await
                .unwrap();
        let (tokens,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(users, 0);
        assert_eq!(tokens, 0);
    }

    #[sqlx::test]
    async fn test_callback_for_unknown_provider(pool: Pool<Postgres>) {
        let state = router::state(pool);
        let app = app(state);

        let response = make_request(
            None,
            app,
            Method::GET,
            "/api/auth/elsewhere/callback?code=abc",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
