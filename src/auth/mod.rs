//! Request authentication and authorization.
//!
//! Every request passes through [`AuthGateway`] before reaching a handler.
//! Three credential mechanisms are supported:
//!
//! - **Static tokens**: fixed header values configured per route. When a route
//!   configures them, they must all match and they bypass everything else.
//! - **Session tokens**: a signed JWT carried in the `jwt_token` cookie or an
//!   `Authorization: Bearer` header, naming a server-side session.
//! - **Anti-forgery tokens**: a double-submit `X-XSRF-TOKEN` header, required
//!   for mutating requests made with the session cookie.
//!
//! Once a session resolves to a consumer, scopes, permission level and the
//! admin flag are checked against the route's [`RouteRequirements`].
//!
//! ## Usage
//!
//! ```ignore
//! let gateway = AuthGateway::new(&config, verifier, store.clone(), store, cache);
//! let mut response_headers = HeaderMap::new();
//! let ctx = gateway
//!     .authenticate(&request_headers, &mut response_headers, &route)
//!     .await?;
//! if let Some(consumer) = ctx.consumer() {
//!     // ...
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

mod authorization;
mod context;
mod cookies;
mod deadline;
mod error;
mod gateway;
mod identity;
mod models;
mod scope;
mod session_token;
mod static_token;
pub mod xsrf;

/// Boxed future returned by the store and cache traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use authorization::{AuthorizationEngine, PermissionChecker, RingPermissionChecker};
pub use context::{Grant, Identity, PermissionLevel, RequestAuthContext, RouteRequirements};
pub use cookies::{ResponseCookie, apply_cookies, cookie_value};
pub use error::{AuthError, AuthResult, DenialKind, ScopeDenial, TokenError, XsrfFailure};
pub use gateway::{AuthGateway, Decision};
pub use identity::{ConsumerStore, IdentityResolver, MemoryAuthStore, SessionStore};
pub use models::{AuthenticatedUser, Consumer, ResourceGrant, Ring, Session};
pub use scope::match_scopes;
pub use session_token::{
    JwtSessionCodec, SessionJwtClaims, TokenSource, TokenVerifier, VerifiedClaims,
    authenticate_session_token, extract_token,
};
pub use static_token::{StaticToken, StaticTokenOutcome, StaticTokenParseError, check_static_tokens};
pub use xsrf::{AntiForgeryGuard, DEFAULT_XSRF_TTL_SECONDS, MemoryCache, SharedCache};
