//! Uniform response envelope.
//!
//! Every endpoint, success or failure, answers with the same body shape so
//! front-end code can always read `success`/`message` first.

use axum::Json;
use serde::{Deserialize, Serialize};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Body shared by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: String,
    pub timestamp: String,
}

impl<T: Serialize> Envelope<T> {
    /// Wrap `data` into a successful envelope.
    pub fn success(data: T, message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: message.to_owned(),
            timestamp: now(),
        })
    }
}

impl Envelope<()> {
    /// Build a failure envelope carrying only a message.
    pub fn error(message: &str) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            message: message.to_owned(),
            timestamp: now(),
        })
    }
}

fn now() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_envelope_shape() {
        let body =
            serde_json::to_value(Envelope::error("nope").0).expect("serialize");
        assert_eq!(body["success"], false);
        assert_eq!(body["data"], serde_json::Value::Null);
        assert_eq!(body["message"], "nope");
        // `yyyy-MM-ddTHH:mm:ss`, no sub-second part.
        assert_eq!(body["timestamp"].as_str().map(str::len), Some(19));
    }

    #[test]
    fn test_success_envelope_keeps_data() {
        let body = serde_json::to_value(Envelope::success(7u8, "ok").0)
            .expect("serialize");
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], 7);
    }
}
