//! Double-submit anti-forgery tokens for cookie-carried sessions.
//!
//! Each session has exactly one current token in the shared cache. Reads get
//! the current token (creating one if needed) echoed back as a cookie and never
//! need the header. Mutations must present the current token in the
//! `X-XSRF-TOKEN` header; on success the token is rotated so it cannot be
//! replayed for another mutation.
//!
//! Concurrent mutations on the same session race on rotation and resolve
//! last-write-wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::auth::BoxFuture;
use crate::auth::context::PermissionLevel;
use crate::auth::cookies::ResponseCookie;
use crate::auth::deadline::within;
use crate::auth::error::{AuthError, AuthResult, XsrfFailure};
use crate::auth::static_token::secrets_match;
use crate::types::SessionId;

/// Default anti-forgery token lifetime in seconds (30 minutes).
pub const DEFAULT_XSRF_TTL_SECONDS: u64 = 1800;

/// Key/value cache shared by every request (and every instance).
pub trait SharedCache: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<Option<String>>>;

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Process-local [`SharedCache`] with per-entry expiry.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, (String, StdInstant)>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) {
        let now = StdInstant::now();
        self.entries.write().await.retain(|_, (_, exp)| *exp > now);
    }

    /// Purge expired entries every `every` on a background task.
    pub fn spawn_purge(&self, every: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                cache.purge_expired().await;
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl SharedCache for MemoryCache {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, anyhow::Result<Option<String>>> {
        Box::pin(async move {
            let now = StdInstant::now();
            {
                let entries = self.entries.read().await;
                match entries.get(key) {
                    Some((value, exp)) if *exp > now => return Ok(Some(value.clone())),
                    None => return Ok(None),
                    Some(_) => {}
                }
            }

            // Expired: evict it, unless a fresh value landed in between.
            let mut entries = self.entries.write().await;
            let fresh = entries
                .get(key)
                .filter(|(_, exp)| *exp > now)
                .map(|(value, _)| value.clone());
            if fresh.is_none() {
                entries.remove(key);
            }
            Ok(fresh)
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Duration,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let mut entries = self.entries.write().await;
            entries.insert(key.to_string(), (value, StdInstant::now() + ttl));
            Ok(())
        })
    }
}

/// Cache key holding the current token of a session.
pub fn cache_key(session_id: &SessionId) -> String {
    format!("authentication:xsrf:{}", session_id)
}

/// 32 random bytes, URL-safe base64.
pub fn generate_token() -> String {
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Issues, checks and rotates anti-forgery tokens.
pub struct AntiForgeryGuard {
    cache: Arc<dyn SharedCache>,
    ttl: Duration,
    cookie_name: String,
}

impl AntiForgeryGuard {
    pub fn new(cache: Arc<dyn SharedCache>, ttl: Duration, cookie_name: impl Into<String>) -> Self {
        Self {
            cache,
            ttl,
            cookie_name: cookie_name.into(),
        }
    }

    /// The session's current token, if any.
    pub async fn current_token(
        &self,
        session_id: &SessionId,
        deadline: Instant,
    ) -> AuthResult<Option<String>> {
        let key = cache_key(session_id);
        within(deadline, "xsrf_lookup", self.cache.get(&key))
            .await?
            .map_err(|e| {
                error!(session_id = %session_id, "xsrf cache lookup failed: {:#}", e);
                AuthError::Cache(e.to_string())
            })
    }

    /// Generate a new token and make it the session's current one.
    async fn issue(&self, session_id: &SessionId, deadline: Instant) -> AuthResult<String> {
        let key = cache_key(session_id);
        let token = generate_token();
        within(
            deadline,
            "xsrf_store",
            self.cache.set(&key, token.clone(), self.ttl),
        )
        .await?
        .map_err(|e| {
            error!(session_id = %session_id, "xsrf cache write failed: {:#}", e);
            AuthError::Cache(e.to_string())
        })?;
        Ok(token)
    }

    /// Run the anti-forgery protocol for a cookie-based session.
    ///
    /// Returns the cookie to set on the response.
    pub async fn enforce(
        &self,
        session_id: &SessionId,
        presented: Option<&str>,
        level: PermissionLevel,
        deadline: Instant,
    ) -> AuthResult<ResponseCookie> {
        let existing = self.current_token(session_id, deadline).await?;

        let token = if level.is_mutating() {
            debug!(session_id = %session_id, "checking xsrf token");
            let failure = match (presented, existing.as_deref()) {
                (None, _) => Some(XsrfFailure::MissingHeader),
                (Some(_), None) => Some(XsrfFailure::NoCachedToken),
                (Some(got), Some(want)) if !secrets_match(got, want) => Some(XsrfFailure::Mismatch),
                _ => None,
            };
            if let Some(failure) = failure {
                warn!(session_id = %session_id, %failure, "xsrf check rejected request");
                return Err(failure.into());
            }
            self.issue(session_id, deadline).await?
        } else {
            match existing {
                Some(token) => token,
                None => self.issue(session_id, deadline).await?,
            }
        };

        Ok(ResponseCookie::new(
            self.cookie_name.clone(),
            token,
            i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX),
        ))
    }
}
