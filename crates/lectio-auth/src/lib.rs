//! Lectio session authentication library
//!
//! Token cache, refresh transport, and the backend response envelope shared
//! by the client crate. Standalone library with no dependency on the request
//! pipeline, so it can be tested and reused independently.
//!
//! Session flow:
//! 1. Login (or a cookie-backed refresh) yields an access token inside the
//!    `{ statusCode, message, data }` envelope
//! 2. The token is kept in [`TokenCache`], optionally persisted to disk
//! 3. When the backend answers 401, the session manager calls
//!    [`refresh_session`] and stores the replacement token
//! 4. Logout clears the cache

pub mod envelope;
pub mod error;
pub mod refresh;
pub mod token;

pub use envelope::{ApiEnvelope, SessionData, SessionEnvelope};
pub use error::{Error, Result};
pub use refresh::{RefreshOutcome, refresh_session};
pub use token::{AccessToken, TokenCache};
