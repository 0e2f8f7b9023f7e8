//! Session refresh transport
//!
//! The refresh endpoint is cookie-authenticated: the backend reads the
//! HTTP-only refresh cookie and issues a new access token. The reqwest client
//! passed in must be built with a cookie store, otherwise the call always
//! comes back 401.
//!
//! Every failure mode (transport error, non-2xx status, malformed envelope,
//! missing token) is a refresh failure; the caller treats them uniformly.

use std::time::Duration;

use serde_json::Value;

use crate::envelope::SessionEnvelope;
use crate::error::{Error, Result};
use crate::token::AccessToken;

/// Result of a successful refresh call.
#[derive(Debug)]
pub struct RefreshOutcome {
    pub access_token: AccessToken,
    /// Updated account payload, if the backend included one.
    pub user: Option<Value>,
}

/// Exchange the refresh cookie for a new access token.
///
/// Issues `GET {base_url}{refresh_path}` with the given timeout. A timeout
/// on this call is a refresh failure like any other.
pub async fn refresh_session(
    client: &reqwest::Client,
    base_url: &str,
    refresh_path: &str,
    timeout: Duration,
) -> Result<RefreshOutcome> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), refresh_path);

    let response = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| Error::Http(format!("refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::RefreshRejected(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    let envelope = response
        .json::<SessionEnvelope>()
        .await
        .map_err(|e| Error::MalformedEnvelope(format!("invalid refresh response: {e}")))?;

    let (token, user) = envelope.into_token()?;
    Ok(RefreshOutcome {
        access_token: AccessToken::new(token),
        user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::response::IntoResponse;
    use axum::routing::get;

    /// Serve a router on an ephemeral port and return its base URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        format!("http://{addr}")
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder().cookie_store(true).build().unwrap()
    }

    #[tokio::test]
    async fn refresh_parses_canonical_envelope() {
        let app = Router::new().route(
            "/auth/refresh",
            get(|| async {
                axum::Json(serde_json::json!({
                    "statusCode": 200,
                    "message": "refreshed",
                    "data": { "access_token": "at_new", "user": { "id": 3 } }
                }))
            }),
        );
        let base = serve(app).await;

        let outcome = refresh_session(&client(), &base, "/auth/refresh", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.access_token.reveal(), "at_new");
        assert_eq!(outcome.user.unwrap()["id"], 3);
    }

    #[tokio::test]
    async fn refresh_accepts_legacy_top_level_token() {
        let app = Router::new().route(
            "/auth/refresh",
            get(|| async {
                axum::Json(serde_json::json!({
                    "statusCode": 200,
                    "message": "refreshed",
                    "access_token": "at_legacy"
                }))
            }),
        );
        let base = serve(app).await;

        let outcome = refresh_session(&client(), &base, "/auth/refresh", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.access_token.reveal(), "at_legacy");
    }

    #[tokio::test]
    async fn non_2xx_is_refresh_rejected() {
        let app = Router::new().route(
            "/auth/refresh",
            get(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    axum::Json(serde_json::json!({
                        "statusCode": 401,
                        "message": "refresh cookie missing"
                    })),
                )
            }),
        );
        let base = serve(app).await;

        let err = refresh_session(&client(), &base, "/auth/refresh", Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RefreshRejected(_)), "got: {err:?}");
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn invalid_json_is_malformed_envelope() {
        let app = Router::new().route("/auth/refresh", get(|| async { "not json" }));
        let base = serve(app).await;

        let err = refresh_session(&client(), &base, "/auth/refresh", Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MalformedEnvelope(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn envelope_without_token_is_malformed() {
        let app = Router::new().route(
            "/auth/refresh",
            get(|| async {
                axum::Json(serde_json::json!({
                    "statusCode": 200,
                    "message": "ok",
                    "data": {}
                }))
            }),
        );
        let base = serve(app).await;

        let err = refresh_session(&client(), &base, "/auth/refresh", Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MalformedEnvelope(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_http_error() {
        let err = refresh_session(
            &client(),
            "http://127.0.0.1:1",
            "/auth/refresh",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Http(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn refresh_sends_stored_cookie() {
        // Login sets an HTTP-only cookie; the refresh call must carry it back.
        async fn login() -> impl IntoResponse {
            (
                [(header::SET_COOKIE, "refresh_token=rt_1; HttpOnly; Path=/")],
                axum::Json(serde_json::json!({
                    "statusCode": 200,
                    "message": "ok",
                    "data": { "access_token": "at_login" }
                })),
            )
        }

        async fn refresh(headers: HeaderMap) -> impl IntoResponse {
            let has_cookie = headers
                .get(header::COOKIE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|c| c.contains("refresh_token=rt_1"));
            if has_cookie {
                (
                    StatusCode::OK,
                    axum::Json(serde_json::json!({
                        "statusCode": 200,
                        "message": "ok",
                        "data": { "access_token": "at_refreshed" }
                    })),
                )
            } else {
                (
                    StatusCode::UNAUTHORIZED,
                    axum::Json(serde_json::json!({
                        "statusCode": 401,
                        "message": "refresh cookie missing"
                    })),
                )
            }
        }

        let app = Router::new()
            .route("/auth/login", get(login))
            .route("/auth/refresh", get(refresh));
        let base = serve(app).await;

        let client = client();
        // Prime the cookie jar via the login route.
        client
            .get(format!("{base}/auth/login"))
            .send()
            .await
            .unwrap();

        let outcome = refresh_session(&client, &base, "/auth/refresh", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(outcome.access_token.reveal(), "at_refreshed");
    }
}
