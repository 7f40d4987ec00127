//! Error handler for litcircle.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::ValidationErrors;

use crate::response::Envelope;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error("token signing failed")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("invalid or expired credential")]
    InvalidToken,

    #[error("refresh token not found")]
    TokenNotFound,

    #[error("refresh token expired")]
    TokenExpired,

    #[error("identity provider error: {0}")]
    UpstreamAuth(String),

    #[error("missing or invalid 'Authorization' header")]
    Unauthorized,

    #[error("operation not allowed for this user")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Invalid(&'static str),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::Validation(_)
            | ServerError::Axum(_)
            | ServerError::Invalid(_) => StatusCode::BAD_REQUEST,

            ServerError::InvalidToken
            | ServerError::TokenNotFound
            | ServerError::TokenExpired
            | ServerError::Unauthorized => StatusCode::UNAUTHORIZED,

            ServerError::Forbidden => StatusCode::FORBIDDEN,

            ServerError::NotFound(_) | ServerError::Sql(SQLxError::RowNotFound) => {
                StatusCode::NOT_FOUND
            },

            ServerError::UpstreamAuth(_) => StatusCode::BAD_GATEWAY,

            ServerError::Sql(_)
            | ServerError::Jwt(_)
            | ServerError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            ServerError::Validation(errors) => validation_message(errors),

            ServerError::Sql(SQLxError::RowNotFound) => {
                "resource not found".to_owned()
            },

            ServerError::Sql(err) => {
                tracing::error!(error = %err, "SQL request failed");
                "internal server error".to_owned()
            },

            ServerError::Jwt(err) => {
                tracing::error!(error = %err, "token signing failed");
                "internal server error".to_owned()
            },

            ServerError::Internal { details, source } => {
                tracing::error!(?source, %details, "server returned 500 status");
                "internal server error".to_owned()
            },

            other => other.to_string(),
        };

        (status, Envelope::error(&message)).into_response()
    }
}

fn validation_message(errors: &ValidationErrors) -> String {
    let fields: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| format!("{field}: {issue}"))
        })
        .collect();

    if fields.is_empty() {
        "validation error occurred".to_owned()
    } else {
        fields.join(" ")
    }
}
