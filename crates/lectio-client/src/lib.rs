//! Lectio API client
//!
//! Authenticated HTTP client for the Lectio backend. Every product API call
//! goes through [`ApiClient`], which attaches the bearer token, recovers from
//! session expiry with a single-flight refresh, retries one class of
//! transient network failure, and notifies subscribers when the session is
//! refreshed.
//!
//! Request lifecycle:
//! 1. Caller builds a request via [`ApiClient::get`] / [`ApiClient::post`] / ...
//! 2. The pipeline attaches `Authorization: Bearer <token>` from the cache;
//!    multipart bodies carry no explicit content-type
//! 3. A 401 triggers at most one concurrent refresh; the expired request is
//!    replayed once with the new token
//! 4. A transport failure with no response at all is retried once after a
//!    fixed delay
//! 5. Terminal failures surface as [`Error`] values; recovered ones are
//!    invisible to the caller

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod session;

pub use client::{ApiClient, ApiResponse, RequestBuilder};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use events::{SessionEvents, SessionRefreshed, SubscriberId};
pub use session::{Credentials, SessionManager};
