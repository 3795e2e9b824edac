//! Error taxonomy for the auth pipeline.
//!
//! Every variant carries enough detail for audit logging, but callers of the
//! HTTP layer only ever see the [`DenialKind`] it maps to.

use std::collections::BTreeSet;
use std::fmt;

use http::StatusCode;

use crate::auth::context::PermissionLevel;
use crate::types::{ConsumerId, ResourceKey, Scope, SessionId};

/// The coarse outcome reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    /// No credential, or the credential could not be verified.
    Unauthorized,
    /// Identity is known but does not carry enough privilege.
    Forbidden,
    /// The request deadline fired before the pipeline finished.
    Timeout,
}

impl DenialKind {
    /// HTTP status for this denial.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
        }
    }

    /// Generic message safe to echo to the caller.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::Timeout => "Request timed out during authentication",
        }
    }
}

/// Why a session token failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Signature and structure are fine but `exp` has passed.
    Expired,
    /// The signature does not match the payload.
    BadSignature,
    /// The token could not be decoded at all.
    Malformed(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => write!(f, "token expired"),
            Self::BadSignature => write!(f, "bad token signature"),
            Self::Malformed(msg) => write!(f, "malformed token: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

/// Why the anti-forgery check rejected a mutating request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XsrfFailure {
    /// The request did not carry the anti-forgery header.
    MissingHeader,
    /// No token is cached for the session.
    NoCachedToken,
    /// Header and cached token differ.
    Mismatch,
}

impl fmt::Display for XsrfFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "missing anti-forgery header"),
            Self::NoCachedToken => write!(f, "no anti-forgery token for session"),
            Self::Mismatch => write!(f, "anti-forgery token mismatch"),
        }
    }
}

/// A failed scope match, keeping both sides for the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeDenial {
    pub granted: BTreeSet<Scope>,
    pub required: BTreeSet<Scope>,
}

impl fmt::Display for ScopeDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |set: &BTreeSet<Scope>| {
            set.iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            f,
            "token scope ({}) doesn't match ({})",
            join(&self.granted),
            join(&self.required)
        )
    }
}

/// Authentication and authorization errors.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// A configured static header was missing or had the wrong value.
    StaticTokenRejected { header: String },
    /// The session token failed verification.
    InvalidToken(TokenError),
    /// The anti-forgery check failed.
    Xsrf(XsrfFailure),
    /// The session referenced by the token does not exist.
    SessionNotFound(SessionId),
    /// The session exists but its validity window has closed.
    SessionExpired(SessionId),
    /// The session's owning consumer does not exist.
    ConsumerNotFound(ConsumerId),
    /// Granted and required scopes do not intersect.
    ScopeMismatch(ScopeDenial),
    /// The route needs an identity and none was resolved.
    Unauthenticated,
    /// The consumer lacks the permission level the route declares.
    PermissionDenied {
        required: PermissionLevel,
        resource: Option<ResourceKey>,
    },
    /// The route is admin-only and the consumer is not an admin.
    AdminRequired,
    /// The session/consumer store failed.
    Store(String),
    /// The shared cache failed.
    Cache(String),
    /// The request deadline fired mid-pipeline.
    Timeout,
}

impl AuthError {
    /// Map this error to what the caller is allowed to see.
    pub fn kind(&self) -> DenialKind {
        match self {
            Self::PermissionDenied { .. } | Self::AdminRequired => DenialKind::Forbidden,
            Self::Timeout => DenialKind::Timeout,
            _ => DenialKind::Unauthorized,
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }

    /// Whether this error came from infrastructure rather than a credential.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Cache(_))
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaticTokenRejected { header } => {
                write!(f, "Static token rejected for header {}", header)
            }
            Self::InvalidToken(err) => write!(f, "Invalid session token: {}", err),
            Self::Xsrf(failure) => write!(f, "XSRF check failed: {}", failure),
            Self::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            Self::SessionExpired(id) => write!(f, "Session expired: {}", id),
            Self::ConsumerNotFound(id) => write!(f, "Consumer not found: {}", id),
            Self::ScopeMismatch(denial) => write!(f, "Scope mismatch: {}", denial),
            Self::Unauthenticated => write!(f, "Authentication required"),
            Self::PermissionDenied { required, resource } => match resource {
                Some(resource) => write!(
                    f,
                    "Permission {} required on {}",
                    required.as_str(),
                    resource
                ),
                None => write!(f, "Permission {} required", required.as_str()),
            },
            Self::AdminRequired => write!(f, "Admin identity required"),
            Self::Store(msg) => write!(f, "Store error: {}", msg),
            Self::Cache(msg) => write!(f, "Cache error: {}", msg),
            Self::Timeout => write!(f, "Authentication timed out"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        Self::InvalidToken(err)
    }
}

impl From<XsrfFailure> for AuthError {
    fn from(failure: XsrfFailure) -> Self {
        Self::Xsrf(failure)
    }
}

/// Result type for pipeline stages.
pub type AuthResult<T> = Result<T, AuthError>;
