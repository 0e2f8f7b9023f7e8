//! Access token value and process-wide token cache
//!
//! The cache is the single home for the current bearer token. Exactly one
//! writer (the session manager) updates it; the request path only reads.
//! No expiry is tracked client-side; an expired token is discovered via a
//! 401 from the backend.
//!
//! File persistence uses atomic temp-file + rename so a crash cannot leave a
//! torn cache, with 0600 permissions since the file holds a live credential.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};
use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Opaque bearer credential.
///
/// Redacted in Debug/Display output and zeroized on drop. The raw value is
/// only reachable through [`AccessToken::reveal`] and [`AccessToken::bearer`].
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the raw token value (use sparingly).
    pub fn reveal(&self) -> &str {
        &self.0
    }

    /// Render the `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Drop for AccessToken {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// On-disk shape of the cache file.
#[derive(Serialize, Deserialize)]
struct CacheFile {
    access_token: Option<String>,
}

/// Process-wide store for the current access token.
///
/// In-memory by default; when constructed with [`TokenCache::load`] every
/// update is also persisted so a restarted process resumes its session.
pub struct TokenCache {
    path: Option<PathBuf>,
    state: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    /// Cache without persistence. Tokens live only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(None),
        }
    }

    /// Load the cache from the given file path.
    ///
    /// A missing file means a cold start: the cache is created empty and the
    /// process begins unauthenticated until login or a cookie-backed refresh
    /// succeeds.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let token = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading token cache: {e}")))?;
            let file: CacheFile = serde_json::from_str(&contents)
                .map_err(|e| Error::CacheParse(format!("parsing token cache: {e}")))?;
            match file.access_token {
                Some(value) => {
                    debug!(path = %path.display(), "loaded cached session token");
                    Some(AccessToken::new(value))
                }
                None => None,
            }
        } else {
            info!(path = %path.display(), "token cache not found, starting unauthenticated");
            write_atomic(&path, None).await?;
            None
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(token),
        })
    }

    /// Get a clone of the current token, if any.
    pub async fn current(&self) -> Option<AccessToken> {
        let state = self.state.lock().await;
        state.clone()
    }

    /// Replace the cached token.
    ///
    /// The in-memory value is updated even when persistence fails, so the
    /// request path keeps working with the fresh token.
    pub async fn store(&self, token: AccessToken) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = Some(token);
        if let Some(path) = &self.path {
            write_atomic(path, state.as_ref()).await?;
        }
        Ok(())
    }

    /// Drop the cached token (logout or permanently invalid session).
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = None;
        if let Some(path) = &self.path {
            write_atomic(path, None).await?;
        }
        debug!("token cache cleared");
        Ok(())
    }
}

/// Write the cache file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets 0600 permissions since the file holds a bearer token.
async fn write_atomic(path: &Path, token: Option<&AccessToken>) -> Result<()> {
    let file = CacheFile {
        access_token: token.map(|t| t.reveal().to_string()),
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| Error::CacheParse(format!("serializing token cache: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("token cache path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".token.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp token cache: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting token cache permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp token cache: {e}")))?;

    debug!(path = %path.display(), "persisted token cache");
    Ok(())
}
