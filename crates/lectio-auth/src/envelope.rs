//! Backend response envelope
//!
//! Every Lectio backend response wraps its payload in
//! `{ statusCode, message, data }`. The session endpoints (login, refresh)
//! place the issued access token at `data.access_token`; older backend builds
//! emitted it at the top level instead, which is still accepted as a
//! migration shim (see [`SessionEnvelope::into_token`]).

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};

/// Generic wire envelope for backend responses.
///
/// `data` is endpoint-specific. Product-layer callers deserialize into their
/// own payload types; this crate only cares about the session endpoints.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

/// Envelope returned by the login and refresh endpoints.
///
/// The canonical token location is `data.access_token`. A top-level
/// `access_token` is deserialized too so sessions issued by pre-envelope
/// backend builds keep working during the migration.
#[derive(Debug, Deserialize)]
pub struct SessionEnvelope {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<SessionData>,
    /// Legacy token location. Read only when `data.access_token` is absent.
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Session payload inside the envelope.
#[derive(Debug, Deserialize)]
pub struct SessionData {
    #[serde(default)]
    pub access_token: Option<String>,
    /// Updated account payload, carried opaquely for the refresh notification.
    #[serde(default)]
    pub user: Option<Value>,
}

impl SessionEnvelope {
    /// Extract the access token and optional user payload.
    ///
    /// Prefers the canonical `data.access_token`. A non-empty top-level
    /// `access_token` is accepted with a warning so the shim can be retired
    /// once every backend emits the nested shape. An envelope with no token
    /// in either location is malformed.
    pub fn into_token(self) -> Result<(String, Option<Value>)> {
        let SessionEnvelope {
            data,
            access_token: legacy,
            ..
        } = self;

        let (nested, user) = match data {
            Some(session) => (session.access_token, session.user),
            None => (None, None),
        };

        if let Some(token) = nested.filter(|t| !t.is_empty()) {
            return Ok((token, user));
        }

        match legacy.filter(|t| !t.is_empty()) {
            Some(token) => {
                warn!("access token found at envelope top level, backend should emit data.access_token");
                Ok((token, user))
            }
            None => Err(Error::MalformedEnvelope(
                "session envelope carries no access token".into(),
            )),
        }
    }
}
