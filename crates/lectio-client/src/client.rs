//! Authenticated request pipeline
//!
//! Every product API call flows through [`ApiClient`]:
//!
//! 1. The bearer token from the cache is attached to the outgoing request.
//!    Multipart bodies get no explicit content-type so the transport computes
//!    the boundary itself.
//! 2. A 401 joins (or starts) the single-flight refresh, then the request is
//!    replayed once with the fresh token. A second 401 is terminal.
//! 3. A pure transport failure (no HTTP response at all) is retried exactly
//!    once after a fixed delay. The refresh path and the transport-retry path
//!    are mutually exclusive: a request either has a response or it doesn't.
//!
//! Requests are kept as owned descriptors so a replay rebuilds the identical
//! request instead of reusing a consumed body.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};

use lectio_auth::TokenCache;

use crate::config::ClientConfig;
use crate::error::{Error, Result, normalize_error_body};
use crate::session::SessionManager;

/// One multipart field: either a text value or file bytes.
enum MultipartField {
    Text {
        name: String,
        value: String,
    },
    Bytes {
        name: String,
        file_name: String,
        mime: String,
        data: Vec<u8>,
    },
}

enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<MultipartField>),
}

/// Owned request intent, rebuildable for replay after a refresh or a
/// transport retry.
struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: RequestBody,
}

/// What to do with a response, given whether this request was already
/// replayed after a refresh.
#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    /// Hand the response to the caller (success and non-auth errors).
    Deliver,
    /// Join or start the single-flight refresh, then resubmit.
    RefreshAndReplay,
    /// 401 after a replay; terminal.
    Expired,
}

fn classify(status: StatusCode, replayed: bool) -> Disposition {
    if status == StatusCode::UNAUTHORIZED {
        if replayed {
            Disposition::Expired
        } else {
            Disposition::RefreshAndReplay
        }
    } else {
        Disposition::Deliver
    }
}

/// Why a dispatch attempt produced no response.
enum DispatchFailure {
    /// The request itself is unusable (bad mime type etc). Never retried.
    Request(Error),
    /// Transport-level failure: reset, DNS, timeout. Eligible for the
    /// one-shot retry.
    Transport(reqwest::Error),
}

/// Successful response handed back to callers.
#[derive(Debug)]
pub struct ApiResponse {
    status: u16,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Deserialize the response body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| Error::Decode(format!("response body: {e}")))
    }
}

/// Authenticated HTTP client for the Lectio backend.
///
/// Cheap to share: wrap in `Arc` and clone the handle wherever requests are
/// issued. The session manager is reachable via [`ApiClient::session`] for
/// login, logout, and refresh-event subscriptions.
pub struct ApiClient {
    http: reqwest::Client,
    session: SessionManager,
    base_url: String,
    request_timeout: Duration,
    network_retry_delay: Duration,
}

impl ApiClient {
    /// Build a client from config. Creates the cookie-enabled transport, the
    /// token cache (file-backed when configured), and the session manager.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| Error::Config(format!("building HTTP client: {e}")))?;

        let cache = match &config.token_cache_path {
            Some(path) => TokenCache::load(path.clone())
                .await
                .map_err(|e| Error::Cache(e.to_string()))?,
            None => TokenCache::in_memory(),
        };

        let session = SessionManager::new(http.clone(), Arc::new(cache), &config);

        Ok(Self {
            http,
            session,
            base_url: config.base_url,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            network_retry_delay: Duration::from_millis(config.network_retry_delay_ms),
        })
    }

    /// Session manager handle: login/logout, current token, refresh events.
    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn get(&self, path: &str) -> RequestBuilder<'_> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> RequestBuilder<'_> {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: &str) -> RequestBuilder<'_> {
        self.request(Method::PUT, path)
    }

    pub fn patch(&self, path: &str) -> RequestBuilder<'_> {
        self.request(Method::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder<'_> {
        self.request(Method::DELETE, path)
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder<'_> {
        RequestBuilder {
            client: self,
            request: ApiRequest {
                method,
                path: path.to_string(),
                query: Vec::new(),
                headers: Vec::new(),
                body: RequestBody::Empty,
            },
            invalid: None,
        }
    }

    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        metrics::counter!("client_requests_total", "method" => request.method.to_string())
            .increment(1);
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        self.run(request, request_id).await
    }

    #[instrument(skip_all, fields(request_id = %request_id, method = %request.method, path = %request.path))]
    async fn run(&self, request: ApiRequest, request_id: String) -> Result<ApiResponse> {
        let mut replayed = false;
        let mut network_retried = false;

        loop {
            let response = match self.dispatch(&request).await {
                Ok(response) => response,
                Err(DispatchFailure::Request(e)) => return Err(e),
                Err(DispatchFailure::Transport(e)) if !network_retried => {
                    network_retried = true;
                    metrics::counter!("client_network_retries_total").increment(1);
                    warn!(
                        error = %e,
                        delay_ms = self.network_retry_delay.as_millis() as u64,
                        "transport failure, retrying once"
                    );
                    tokio::time::sleep(self.network_retry_delay).await;
                    continue;
                }
                Err(DispatchFailure::Transport(e)) => {
                    error!(error = %e, "transport failure after retry");
                    return Err(Error::Network(e.to_string()));
                }
            };

            match classify(response.status(), replayed) {
                Disposition::RefreshAndReplay => {
                    replayed = true;
                    debug!("session expired upstream, requesting refresh");
                    self.session.refresh().await?;
                    continue;
                }
                Disposition::Expired => {
                    warn!("replayed request still unauthorized, surfacing to caller");
                    return Err(Error::SessionExpired);
                }
                Disposition::Deliver => {}
            }

            let status = response.status();
            let raw = response
                .bytes()
                .await
                .map_err(|e| Error::Network(format!("reading response body: {e}")))?;

            if !status.is_success() {
                let (message, body) = normalize_error_body(&raw);
                debug!(status = status.as_u16(), "API error passed through");
                return Err(Error::Api {
                    status: status.as_u16(),
                    message,
                    body,
                });
            }

            return Ok(ApiResponse {
                status: status.as_u16(),
                body: raw.to_vec(),
            });
        }
    }

    /// Build and send one attempt. Reads the current token at call time, so
    /// a replay after refresh automatically carries the new header.
    async fn dispatch(
        &self,
        request: &ApiRequest,
    ) -> std::result::Result<reqwest::Response, DispatchFailure> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), request.path);
        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .timeout(self.request_timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        let multipart = matches!(request.body, RequestBody::Multipart(_));
        for (name, value) in &request.headers {
            if multipart && name.eq_ignore_ascii_case("content-type") {
                debug!("dropping explicit content-type for multipart body");
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(token) = self.session.token().await {
            builder = builder.header(header::AUTHORIZATION, token.bearer());
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(fields) => {
                builder.multipart(build_form(fields).map_err(DispatchFailure::Request)?)
            }
        };

        builder.send().await.map_err(|e| {
            if e.is_builder() {
                DispatchFailure::Request(Error::InvalidRequest(e.to_string()))
            } else {
                DispatchFailure::Transport(e)
            }
        })
    }
}

/// Rebuild the multipart form for one attempt. The transport sets the
/// content-type with its computed boundary.
fn build_form(fields: &[MultipartField]) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for field in fields {
        form = match field {
            MultipartField::Text { name, value } => form.text(name.clone(), value.clone()),
            MultipartField::Bytes {
                name,
                file_name,
                mime,
                data,
            } => {
                let part = reqwest::multipart::Part::bytes(data.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime)
                    .map_err(|e| Error::InvalidRequest(format!("mime type {mime}: {e}")))?;
                form.part(name.clone(), part)
            }
        };
    }
    Ok(form)
}

/// Builder for one API request.
pub struct RequestBuilder<'a> {
    client: &'a ApiClient,
    request: ApiRequest,
    invalid: Option<Error>,
}

impl RequestBuilder<'_> {
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.query.push((name.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.push((name.into(), value.into()));
        self
    }

    /// JSON body. The content-type is set by the transport.
    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.request.body = RequestBody::Json(value),
            Err(e) => {
                self.invalid = Some(Error::InvalidRequest(format!("serializing body: {e}")))
            }
        }
        self
    }

    /// Add a text field to a multipart body.
    pub fn text_part(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.multipart_fields().push(MultipartField::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Add a file field to a multipart body.
    pub fn file_part(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.multipart_fields().push(MultipartField::Bytes {
            name: name.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            data,
        });
        self
    }

    fn multipart_fields(&mut self) -> &mut Vec<MultipartField> {
        if !matches!(self.request.body, RequestBody::Multipart(_)) {
            self.request.body = RequestBody::Multipart(Vec::new());
        }
        match &mut self.request.body {
            RequestBody::Multipart(fields) => fields,
            _ => unreachable!("body set to multipart above"),
        }
    }

    /// Send the request through the authenticated pipeline.
    pub async fn send(self) -> Result<ApiResponse> {
        if let Some(invalid) = self.invalid {
            return Err(invalid);
        }
        self.client.execute(self.request).await
    }
}
