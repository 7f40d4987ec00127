//! Service health endpoint.

use axum::Json;
use serde::Serialize;

use crate::response::Envelope;

#[derive(Debug, Serialize)]
pub struct Health {
    status: &'static str,
}

/// `GET /api/status`.
pub async fn health() -> Json<Envelope<Health>> {
    Envelope::success(Health { status: "ok" }, "service is up")
}
