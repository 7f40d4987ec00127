//! Manage json web tokens.

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    get_current_timestamp,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// Marks a credential as usable for requests or for rotation only.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    /// External-identity id. Present on access tokens only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Access or refresh.
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Random token id. Two tokens issued within the same second for the
    /// same user must still differ, since refresh tokens are stored and
    /// looked up by value.
    pub jti: String,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing. Seconds since Unix epoch.
    pub exp: u64,
}

impl Claims {
    /// Numeric user id carried by the `sub` claim.
    pub fn user_id(&self) -> Result<i64> {
        self.sub.parse().map_err(|_| ServerError::InvalidToken)
    }

    /// Expiry as a timestamp.
    pub fn expires_at(&self) -> Result<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp as i64, 0)
            .ok_or(ServerError::InvalidToken)
    }
}

/// Manage JWT tokens.
///
/// Every token is signed with the single shared secret; there is no key
/// rotation and no clock-skew leeway.
#[derive(Clone)]
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_ttl: u64,
    refresh_token_ttl: u64,
}

impl TokenManager {
    /// Create a new [`TokenManager`] instance. TTLs are in seconds.
    pub fn new(
        secret: &str,
        access_token_ttl: u64,
        refresh_token_ttl: u64,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.required_spec_claims =
            ["exp", "sub"].iter().map(|s| (*s).to_string()).collect();

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_token_ttl,
            refresh_token_ttl,
        }
    }

    /// Create a request-scoped access token for a user.
    pub fn create_access(
        &self,
        user_id: i64,
        external_id: &str,
    ) -> Result<String> {
        self.create(
            user_id,
            Some(external_id.to_owned()),
            TokenType::Access,
            self.access_token_ttl,
        )
    }

    /// Create a refresh token for a user. No external-identity claim.
    pub fn create_refresh(&self, user_id: i64) -> Result<String> {
        self.create(user_id, None, TokenType::Refresh, self.refresh_token_ttl)
    }

    fn create(
        &self,
        user_id: i64,
        external_id: Option<String>,
        token_type: TokenType,
        ttl: u64,
    ) -> Result<String> {
        let mut jti = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut jti);

        let now = get_current_timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            external_id,
            token_type,
            jti: hex::encode(jti),
            iat: now,
            exp: now + ttl,
        };

        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    /// Whether a token carries a valid signature and is not expired.
    /// Never fails: any malformed input is simply not valid.
    pub fn validate(&self, token: &str) -> bool {
        decode::<Claims>(token, &self.decoding_key, &self.validation).is_ok()
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!(error = %err, "token rejected");
                ServerError::InvalidToken
            })
    }
}
