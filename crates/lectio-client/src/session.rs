//! Session lifecycle and single-flight refresh coordination
//!
//! At most one refresh call is in flight at any time. The first caller that
//! observes an expired session while idle becomes the leader and performs the
//! refresh; everyone arriving while a refresh is in flight joins a FIFO queue
//! and is released with the leader's outcome. The state check and the flip to
//! `Refreshing` happen under a single lock acquisition with no await between
//! them, so no task can observe a gap between "decided to refresh" and
//! "refresh in flight".
//!
//! The refresh itself runs on a detached task: cancelling a caller mid-flight
//! abandons that caller's continuation, never the refresh or the other
//! waiters.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use lectio_auth::{AccessToken, SessionEnvelope, TokenCache, refresh_session};

use crate::config::ClientConfig;
use crate::error::{Error, Result, normalize_error_body};
use crate::events::{SessionEvents, SessionRefreshed};

/// Outcome shared with every queued waiter. The error side is a plain string
/// so one refresh failure can fan out to any number of callers.
type RefreshResult = std::result::Result<AccessToken, String>;

enum RefreshState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<RefreshResult>>,
    },
}

/// Login credentials for [`SessionManager::login`].
#[derive(Debug, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Owns the token cache, the refresh coordination state, and the refresh
/// event observers. Constructed once per process; cloning hands out another
/// handle to the same session.
///
/// This is the only writer of the token cache; the request pipeline and any
/// other consumer are readers.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    cache: Arc<TokenCache>,
    events: SessionEvents,
    state: Mutex<RefreshState>,
    base_url: String,
    refresh_path: String,
    refresh_timeout: Duration,
}

impl SessionManager {
    pub fn new(http: reqwest::Client, cache: Arc<TokenCache>, config: &ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                cache,
                events: SessionEvents::new(),
                state: Mutex::new(RefreshState::Idle),
                base_url: config.base_url.clone(),
                refresh_path: config.refresh_path.clone(),
                refresh_timeout: Duration::from_secs(config.refresh_timeout_secs),
            }),
        }
    }

    /// Refresh event observers. Subscribe here to keep in-memory session
    /// state (current-user caches etc) in step with the token.
    pub fn events(&self) -> &SessionEvents {
        &self.inner.events
    }

    /// Current access token, if any.
    pub async fn token(&self) -> Option<AccessToken> {
        self.inner.cache.current().await
    }

    /// Obtain a fresh access token, coalescing concurrent callers into one
    /// refresh call.
    ///
    /// The caller that finds the coordinator idle starts the refresh; every
    /// other caller joins the queue and receives the same outcome. Waiters
    /// are released in join order after listeners have been notified.
    pub async fn refresh(&self) -> Result<AccessToken> {
        let (tx, rx) = oneshot::channel();
        let lead = {
            let mut state = self.inner.state.lock().await;
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    waiters.push(tx);
                    false
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    true
                }
            }
        };

        if lead {
            debug!("starting session refresh");
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run_refresh().await });
        } else {
            debug!("refresh already in flight, joining queue");
        }

        match rx.await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(message)) => Err(Error::RefreshFailed(message)),
            Err(_) => Err(Error::RefreshFailed(
                "refresh task dropped before completing".into(),
            )),
        }
    }
}

impl Inner {
    /// Perform the refresh call and release every waiter with its outcome.
    async fn run_refresh(&self) {
        let outcome = refresh_session(
            &self.http,
            &self.base_url,
            &self.refresh_path,
            self.refresh_timeout,
        )
        .await;

        let result: RefreshResult = match outcome {
            Ok(ref outcome) => {
                metrics::counter!("client_refresh_total", "outcome" => "success").increment(1);
                if let Err(e) = self.cache.store(outcome.access_token.clone()).await {
                    warn!(error = %e, "failed to persist refreshed token");
                }
                info!("session refresh succeeded");
                Ok(outcome.access_token.clone())
            }
            Err(ref e) => {
                metrics::counter!("client_refresh_total", "outcome" => "failure").increment(1);
                warn!(error = %e, "session refresh failed");
                Err(e.to_string())
            }
        };

        // Back to Idle before anyone is released; a 401 arriving from here
        // on belongs to a new incident.
        let waiters = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { waiters } => waiters,
                RefreshState::Idle => Vec::new(),
            }
        };

        // Listeners run before any waiter is released.
        if let Ok(outcome) = outcome {
            self.events.emit(&SessionRefreshed {
                access_token: outcome.access_token.reveal().to_string(),
                user: outcome.user,
            });
        }

        // FIFO release in join order. A dropped receiver just means that
        // caller went away; its continuation is discarded.
        for tx in waiters {
            let _ = tx.send(result.clone());
        }
    }
}

impl SessionManager {
    /// Authenticate with credentials and store the issued token.
    ///
    /// The backend sets the HTTP-only refresh cookie on this response; the
    /// shared cookie jar picks it up for later refresh calls. Returns the
    /// account payload when the backend includes one.
    pub async fn login(&self, credentials: &Credentials) -> Result<Option<Value>> {
        let inner = &self.inner;
        let url = format!("{}/auth/login", inner.base_url.trim_end_matches('/'));
        let response = inner
            .http
            .post(&url)
            .json(credentials)
            .timeout(inner.refresh_timeout)
            .send()
            .await
            .map_err(|e| Error::Network(format!("login request failed: {e}")))?;

        let status = response.status();
        let raw = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("reading login response: {e}")))?;

        if !status.is_success() {
            let (message, body) = normalize_error_body(&raw);
            return Err(Error::Api {
                status: status.as_u16(),
                message,
                body,
            });
        }

        let envelope: SessionEnvelope = serde_json::from_slice(&raw)
            .map_err(|e| Error::Decode(format!("login response: {e}")))?;
        let (token, user) = envelope
            .into_token()
            .map_err(|e| Error::Decode(e.to_string()))?;

        if let Err(e) = inner.cache.store(AccessToken::new(token)).await {
            warn!(error = %e, "failed to persist login token");
        }
        info!("login succeeded");
        Ok(user)
    }

    /// End the session. The server call is best effort; the local token is
    /// cleared regardless so the process stops authenticating.
    pub async fn logout(&self) -> Result<()> {
        let inner = &self.inner;
        let url = format!("{}/auth/logout", inner.base_url.trim_end_matches('/'));
        let mut request = inner.http.post(&url).timeout(inner.refresh_timeout);
        if let Some(token) = inner.cache.current().await {
            request = request.header(reqwest::header::AUTHORIZATION, token.bearer());
        }

        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(
                    status = response.status().as_u16(),
                    "logout rejected by server, clearing local session anyway"
                );
            }
            Ok(_) => debug!("logout acknowledged by server"),
            Err(e) => warn!(error = %e, "logout request failed, clearing local session anyway"),
        }

        inner
            .cache
            .clear()
            .await
            .map_err(|e| Error::Cache(e.to_string()))
    }
}
