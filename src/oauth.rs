//! Outbound calls to the external identity provider.
//!
//! Response shapes are strict serde structs: a document missing the fields
//! we need is an upstream error, never a silently-tolerated shape.

use std::time::Duration;

use serde::Deserialize;

use crate::config::OAuthProvider;
use crate::error::{Result, ServerError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Token-endpoint answer. Only `access_token` is required; everything
/// else the provider sends along is ignored.
#[derive(Debug, Deserialize)]
pub struct ProviderToken {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
}

/// Profile-endpoint answer, as the provider nests it.
#[derive(Debug, Deserialize)]
struct ProfileDocument {
    id: i64,
    #[serde(alias = "kakao_account")]
    account: Option<AccountSection>,
}

#[derive(Debug, Deserialize)]
struct AccountSection {
    profile: Option<ProfileSection>,
}

#[derive(Debug, Deserialize)]
struct ProfileSection {
    nickname: Option<String>,
    profile_image_url: Option<String>,
}

/// The identity this service actually needs from the provider.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalProfile {
    pub external_id: String,
    pub nickname: String,
    pub profile_image: Option<String>,
}

impl TryFrom<ProfileDocument> for ExternalProfile {
    type Error = ServerError;

    fn try_from(document: ProfileDocument) -> Result<Self> {
        let profile = document
            .account
            .and_then(|account| account.profile)
            .ok_or_else(|| {
                ServerError::UpstreamAuth("profile response carries no profile section".to_owned())
            })?;
        let nickname = profile.nickname.ok_or_else(|| {
            ServerError::UpstreamAuth("profile response carries no nickname".to_owned())
        })?;

        Ok(Self {
            external_id: document.id.to_string(),
            nickname,
            profile_image: profile.profile_image_url,
        })
    }
}

/// HTTP client against the configured provider.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    config: OAuthProvider,
}

impl OAuthClient {
    /// Build a client with the configured (bounded) timeout.
    pub fn new(config: OAuthProvider) -> Result<Self> {
        let timeout = config
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ServerError::Internal {
                details: "cannot build outbound HTTP client".to_owned(),
                source: Some(Box::new(err)),
            })?;

        Ok(Self { http, config })
    }

    /// Provider name as configured, used on the callback path.
    pub fn provider(&self) -> &str {
        &self.config.provider
    }

    /// Exchange an authorization code for a provider access token.
    pub async fn exchange_code(&self, code: &str) -> Result<String> {
        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("code", code),
            ])
            .send()
            .await
            .map_err(upstream)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "token endpoint refused the exchange");
            return Err(ServerError::UpstreamAuth(format!(
                "token endpoint returned {status}"
            )));
        }

        let token: ProviderToken = response.json().await.map_err(upstream)?;
        tracing::debug!(
            token_type = token.token_type.as_deref(),
            expires_in = token.expires_in,
            "authorization code exchanged"
        );
        Ok(token.access_token)
    }

    /// Fetch the external profile behind a provider access token.
    pub async fn fetch_profile(
        &self,
        access_token: &str,
    ) -> Result<ExternalProfile> {
        let response = self
            .http
            .get(&self.config.profile_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(upstream)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "profile endpoint refused the token");
            return Err(ServerError::UpstreamAuth(format!(
                "profile endpoint returned {status}"
            )));
        }

        let document: ProfileDocument =
            response.json().await.map_err(upstream)?;
        document.try_into()
    }
}

fn upstream(err: reqwest::Error) -> ServerError {
    ServerError::UpstreamAuth(err.to_string())
}
