//! The per-request auth pipeline.
//!
//! Stages run in a fixed order: static tokens, session token (plus the
//! anti-forgery guard for cookie sessions), identity resolution, then the
//! authorization engine. Any stage failure ends the request with that error.

use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::authorization::{AuthorizationEngine, PermissionChecker, RingPermissionChecker};
use crate::auth::context::{RequestAuthContext, RouteRequirements};
use crate::auth::cookies::{ResponseCookie, apply_cookies};
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::identity::{ConsumerStore, IdentityResolver, SessionStore};
use crate::auth::session_token::{TokenVerifier, authenticate_session_token};
use crate::auth::static_token::{StaticTokenOutcome, check_static_tokens};
use crate::auth::xsrf::{AntiForgeryGuard, SharedCache};
use crate::config::{GatewayConfig, MAX_REQUEST_TIMEOUT_MS, MAX_XSRF_TTL_SECONDS};

/// Result of [`AuthGateway::decide`]: the outcome plus cookies to emit.
///
/// Cookies are emitted whatever the outcome, so the client's anti-forgery
/// cookie always tracks the cached token.
#[derive(Debug)]
pub struct Decision {
    pub cookies: Vec<ResponseCookie>,
    pub outcome: AuthResult<RequestAuthContext>,
}

/// Runs the auth pipeline for each request.
pub struct AuthGateway {
    verifier: Arc<dyn TokenVerifier>,
    xsrf: AntiForgeryGuard,
    identity: IdentityResolver,
    engine: AuthorizationEngine,
    session_cookie: String,
    xsrf_header: String,
    request_timeout: Duration,
}

impl AuthGateway {
    /// Create a gateway with the ring-based permission checker.
    ///
    /// Lifetimes above the config maximums are clamped.
    pub fn new(
        config: &GatewayConfig,
        verifier: Arc<dyn TokenVerifier>,
        sessions: Arc<dyn SessionStore>,
        consumers: Arc<dyn ConsumerStore>,
        cache: Arc<dyn SharedCache>,
    ) -> Self {
        Self {
            verifier,
            xsrf: AntiForgeryGuard::new(
                cache,
                Duration::from_secs(config.xsrf_ttl_seconds.min(MAX_XSRF_TTL_SECONDS)),
                config.xsrf_cookie.clone(),
            ),
            identity: IdentityResolver::new(sessions, consumers),
            engine: AuthorizationEngine::new(Arc::new(RingPermissionChecker)),
            session_cookie: config.session_cookie.clone(),
            xsrf_header: config.xsrf_header.clone(),
            request_timeout: Duration::from_millis(
                config.request_timeout_ms.min(MAX_REQUEST_TIMEOUT_MS),
            ),
        }
    }

    /// Replace the permission checker used by the authorization engine.
    pub fn with_permission_checker(mut self, checker: Arc<dyn PermissionChecker>) -> Self {
        self.engine = AuthorizationEngine::new(checker);
        self
    }

    /// Decide, then write any cookies to `response`.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        response: &mut HeaderMap,
        route: &RouteRequirements,
    ) -> AuthResult<RequestAuthContext> {
        let decision = self.decide(headers, route, None).await;
        apply_cookies(&decision.cookies, response);
        decision.outcome
    }

    /// Run the pipeline without touching the response.
    ///
    /// `deadline` defaults to now plus the configured request timeout.
    pub async fn decide(
        &self,
        headers: &HeaderMap,
        route: &RouteRequirements,
        deadline: Option<Instant>,
    ) -> Decision {
        let deadline = deadline.unwrap_or_else(|| Instant::now() + self.request_timeout);
        let mut cookies = Vec::new();
        let outcome = self.run(headers, route, deadline, &mut cookies).await;

        if let Err(e) = &outcome {
            warn!(kind = ?e.kind(), "request denied: {}", e);
        }
        Decision { cookies, outcome }
    }

    async fn run(
        &self,
        headers: &HeaderMap,
        route: &RouteRequirements,
        deadline: Instant,
        cookies: &mut Vec<ResponseCookie>,
    ) -> AuthResult<RequestAuthContext> {
        let mut ctx = RequestAuthContext::new();

        if check_static_tokens(&route.allowed_tokens, headers)? == StaticTokenOutcome::Granted {
            info!("authentication granted by static token");
            let grant = self.engine.authorize(true, None, route, deadline).await?;
            ctx.grant(grant);
            return Ok(ctx);
        }

        let verified = authenticate_session_token(self.verifier.as_ref(), headers, &self.session_cookie)
            .map_err(AuthError::from)?;

        if let Some((claims, source)) = verified {
            if source.is_cookie() {
                let presented = headers
                    .get(self.xsrf_header.as_str())
                    .and_then(|v| v.to_str().ok());
                let cookie = self
                    .xsrf
                    .enforce(claims.session_id(), presented, route.permission, deadline)
                    .await?;
                cookies.push(cookie);
            }

            let (session, consumer) = self.identity.resolve(&claims, deadline).await?;
            ctx.attach_claims(claims, source);
            ctx.attach_identity(session, consumer)?;
        }

        let grant = self
            .engine
            .authorize(false, ctx.consumer(), route, deadline)
            .await?;
        debug!(?grant, "request authorized");
        ctx.grant(grant);
        Ok(ctx)
    }
}
