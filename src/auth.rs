//! Login, refresh and logout flows.
//!
//! Composes the token codec, the refresh-token store and the identity
//! resolver. Every failure is terminal for the current request; nothing
//! here retries.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Result, ServerError};
use crate::oauth::OAuthClient;
use crate::session::SessionStore;
use crate::token::TokenManager;
use crate::user::{User, UserRepository};

const BEARER: &str = "Bearer ";

/// External identity of the fixture account behind `dev-login`.
const DEV_EXTERNAL_ID: &str = "dev-user";
const DEV_NICKNAME: &str = "bookworm";

/// Fresh access/refresh pair handed back by login and refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

/// Authentication use cases.
pub struct AuthService {
    users: UserRepository,
    sessions: SessionStore,
    token: TokenManager,
    oauth: Option<OAuthClient>,
}

impl AuthService {
    /// Create a new [`AuthService`].
    pub fn new(
        users: UserRepository,
        sessions: SessionStore,
        token: TokenManager,
        oauth: Option<OAuthClient>,
    ) -> Self {
        Self {
            users,
            sessions,
            token,
            oauth,
        }
    }

    /// Trade an authorization code for a local session: exchange the code,
    /// fetch the external profile, resolve or create the account, then
    /// issue and persist a token pair.
    pub async fn login(&self, code: &str) -> Result<SessionTokens> {
        let oauth = self.oauth.as_ref().ok_or_else(|| {
            ServerError::UpstreamAuth(
                "no identity provider configured".to_owned(),
            )
        })?;

        let provider_token = oauth.exchange_code(code).await?;
        let profile = oauth.fetch_profile(&provider_token).await?;
        let user = self
            .users
            .resolve_or_create(
                &profile.external_id,
                &profile.nickname,
                profile.profile_image.as_deref(),
            )
            .await?;

        tracing::info!(user_id = user.id, "login succeeded");
        self.issue(user).await
    }

    /// Rotate-on-use refresh: the presented value must be codec-valid,
    /// stored, and not past its stored expiry; it is then replaced by a
    /// fresh pair and deleted.
    pub async fn refresh(&self, presented: &str) -> Result<SessionTokens> {
        if !self.token.validate(presented) {
            return Err(ServerError::InvalidToken);
        }

        let record = self.sessions.find_by_value(presented).await?;

        if record.expires_at <= Utc::now() {
            self.sessions.delete_by_value(presented).await?;
            return Err(ServerError::TokenExpired);
        }

        let user = self.users.find_by_id(record.user_id).await?;
        self.sessions.delete_by_value(presented).await?;

        let tokens = self.issue(user).await?;
        tracing::info!(user_id = record.user_id, "refresh token rotated");
        Ok(tokens)
    }

    /// Log a user out of every session: all refresh tokens owned by the
    /// user behind the presented access token are deleted.
    pub async fn logout(&self, bearer: &str) -> Result<u64> {
        let token =
            bearer.strip_prefix(BEARER).ok_or(ServerError::Unauthorized)?;
        let user_id = self.token.decode(token)?.user_id()?;

        let removed = self.sessions.delete_all_for_user(user_id).await?;
        tracing::info!(user_id, sessions = removed, "logged out");
        Ok(removed)
    }

    /// Development login against a fixture account, bypassing the external
    /// provider. Only routed when enabled in configuration.
    pub async fn dev_login(&self) -> Result<SessionTokens> {
        let user = self
            .users
            .resolve_or_create(DEV_EXTERNAL_ID, DEV_NICKNAME, None)
            .await?;

        self.issue(user).await
    }

    /// Issue an access/refresh pair and persist the refresh half.
    async fn issue(&self, user: User) -> Result<SessionTokens> {
        let access_token =
            self.token.create_access(user.id, &user.external_id)?;
        let refresh_token = self.token.create_refresh(user.id)?;

        let refresh_expiry = self.token.decode(&refresh_token)?.expires_at()?;
        self.sessions
            .save(user.id, &refresh_token, refresh_expiry)
            .await?;

        let expires_at = self.token.decode(&access_token)?.expires_at()?;

        Ok(SessionTokens {
            access_token,
            refresh_token,
            user,
            expires_at,
        })
    }
}
