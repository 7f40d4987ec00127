//! HTTP surface.

pub mod auth;
pub mod comments;
pub mod groups;
pub mod meetings;
pub mod monthly_books;
pub mod posts;
pub mod status;
pub mod users;

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::ServerError;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// JSON body extractor running `validator` checks before the handler.
pub struct Valid<T>(pub T);

impl<S, T> FromRequest<S> for Valid<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(
        req: Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// `page`/`size` query parameters, zero-indexed.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.page.unwrap_or(0).max(0) * self.limit()
    }
}

/// MUST NEVER be used in production.
#[cfg(test)]
pub fn state(pool: sqlx::Pool<sqlx::Postgres>) -> crate::AppState {
    use std::sync::Arc;

    let mut config = crate::config::Configuration::default();
    config.name = "litcircle-test".to_owned();
    config.url = "https://litcircle.test".to_owned();
    config.public_paths = [
        "/",
        "/api/auth/",
        "/api/status",
        "/metrics",
        "/static/",
        "/public/",
    ]
    .map(String::from)
    .to_vec();
    config.dev_login = true;

    crate::AppState {
        config: Arc::new(config),
        db: crate::database::Database { postgres: pool },
        token: crate::token::TokenManager::new(
            "secret-for-tests-only",
            60 * 15,
            60 * 60 * 24 * 14,
        ),
        oauth: None,
        metrics: None,
    }
}
