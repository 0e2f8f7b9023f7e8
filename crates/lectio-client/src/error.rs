//! Client error types
//!
//! Only terminal failures surface here. Session expiry recovered by the
//! refresh-and-replay path and single transport hiccups absorbed by the
//! one-shot retry never reach the caller.

use serde_json::Value;

/// Errors surfaced by the API client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("session refresh failed: {0}")]
    RefreshFailed(String),

    /// 401 on a request that was already replayed with a fresh token.
    /// The caller decides what to do with a dead session (re-login UI etc).
    #[error("session expired")]
    SessionExpired,

    /// Non-2xx backend response, normalized to status + payload.
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        body: Value,
    },

    #[error("response decode failed: {0}")]
    Decode(String),

    #[error("token cache error: {0}")]
    Cache(String),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Normalize an error response body to `(message, payload)`.
///
/// JSON bodies keep their structure and contribute their `message` field;
/// anything else is carried as a plain string.
pub(crate) fn normalize_error_body(raw: &[u8]) -> (String, Value) {
    match serde_json::from_slice::<Value>(raw) {
        Ok(body) => {
            let message = body
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("")
                .to_string();
            (message, body)
        }
        Err(_) => {
            let text = String::from_utf8_lossy(raw).to_string();
            (text.clone(), Value::String(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_includes_status_and_message() {
        let err = Error::Api {
            status: 404,
            message: "class not found".into(),
            body: Value::Null,
        };
        assert_eq!(err.to_string(), "API error (404): class not found");
    }

    #[test]
    fn normalize_json_body_extracts_message() {
        let raw = br#"{"statusCode":409,"message":"duplicate enrollment","data":null}"#;
        let (message, body) = normalize_error_body(raw);
        assert_eq!(message, "duplicate enrollment");
        assert_eq!(body["statusCode"], 409);
    }

    #[test]
    fn normalize_non_json_body_becomes_string() {
        let (message, body) = normalize_error_body(b"Bad Gateway");
        assert_eq!(message, "Bad Gateway");
        assert_eq!(body, Value::String("Bad Gateway".into()));
    }

    #[test]
    fn normalize_json_without_message_is_empty() {
        let (message, body) = normalize_error_body(br#"{"statusCode":500}"#);
        assert_eq!(message, "");
        assert_eq!(body["statusCode"], 500);
    }

    #[test]
    fn error_debug_includes_variant_name() {
        let err = Error::RefreshFailed("endpoint down".into());
        let debug = format!("{err:?}");
        assert!(debug.contains("RefreshFailed"), "got: {debug}");
    }
}
