//! Request authentication filter.
//!
//! Stateless-token model: the principal lives exactly as long as one
//! request, carried as a typed extension, never as ambient global state.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use crate::token::TokenType;
use crate::{AppState, ServerError};

const BEARER: &str = "Bearer ";

/// Identity attached to one in-flight request.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthContext {
    pub user_id: i64,
    pub external_id: Option<String>,
}

/// Handlers take `AuthContext` as an argument to require authentication;
/// a request that reached them without a principal is answered with 401.
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(ServerError::Unauthorized)
    }
}

/// Whether a path is served without a bearer token.
///
/// `"/"` entries match exactly; entries ending in `/` match themselves,
/// the bare prefix, and everything below it.
pub fn is_public_path(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        if prefix == "/" {
            path == "/"
        } else {
            path == prefix.trim_end_matches('/')
                || path == prefix.as_str()
                || (prefix.ends_with('/') && path.starts_with(prefix.as_str()))
        }
    })
}

/// Middleware validating bearer tokens on every non-public request.
///
/// An absent, malformed or invalid credential never fails the pipeline
/// here: the request simply proceeds without a principal and the
/// [`AuthContext`] extractor rejects it later if the handler needs one.
pub async fn session_filter(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if is_public_path(req.uri().path(), &state.config.public_paths) {
        return next.run(req).await;
    }

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix(BEARER));

    if let Some(token) = token {
        if state.token.validate(token) {
            match state.token.decode(token) {
                Ok(claims) if claims.token_type == TokenType::Access => {
                    match claims.user_id() {
                        Ok(user_id) => {
                            req.extensions_mut().insert(AuthContext {
                                user_id,
                                external_id: claims.external_id,
                            });
                        },
                        Err(_) => {
                            tracing::debug!("token subject is not a user id");
                        },
                    }
                },
                Ok(_) => {
                    tracing::debug!("refresh token presented as bearer");
                },
                Err(_) => {},
            }
        }
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes() -> Vec<String> {
        ["/", "/api/auth/", "/api/status", "/metrics"]
            .map(String::from)
            .to_vec()
    }

    #[test]
    fn test_root_matches_exactly() {
        assert!(is_public_path("/", &prefixes()));
        assert!(!is_public_path("/api/users/me", &prefixes()));
    }

    #[test]
    fn test_prefix_matches_subpaths() {
        assert!(is_public_path("/api/auth/refresh", &prefixes()));
        assert!(is_public_path("/api/auth/kakao/callback", &prefixes()));
        assert!(is_public_path("/api/auth", &prefixes()));
        assert!(!is_public_path("/api/authx", &prefixes()));
    }

    #[test]
    fn test_exact_entries_do_not_match_subpaths() {
        assert!(is_public_path("/api/status", &prefixes()));
        assert!(is_public_path("/metrics", &prefixes()));
        assert!(!is_public_path("/api/status/deep", &prefixes()));
    }
}
