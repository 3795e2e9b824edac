//! Route requirements and the request-scoped auth context.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::models::{Consumer, Session};
use crate::auth::session_token::{TokenSource, VerifiedClaims};
use crate::auth::static_token::StaticToken;
use crate::types::{ResourceKey, Scope};

/// Minimum privilege a route demands. Ordered: `Read < Execute < Write < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    #[default]
    Read,
    Execute,
    Write,
    Admin,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Execute => "execute",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }

    /// Anything above read can change state.
    pub fn is_mutating(&self) -> bool {
        *self > Self::Read
    }
}

/// What a route demands from the caller. Attached to the route definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteRequirements {
    /// Static header tokens; all must match. Empty disables the mechanism.
    #[serde(default)]
    pub allowed_tokens: Vec<StaticToken>,
    /// Required scopes. Empty means no restriction.
    #[serde(default)]
    pub scopes: BTreeSet<Scope>,
    #[serde(default)]
    pub permission: PermissionLevel,
    /// Resource the permission applies to, set with the route definition.
    #[serde(default)]
    pub resource: Option<ResourceKey>,
    #[serde(default)]
    pub need_auth: bool,
    #[serde(default)]
    pub need_admin: bool,
}

impl RouteRequirements {
    /// A public, read-only route.
    pub fn public() -> Self {
        Self::default()
    }

    /// A route that requires an authenticated consumer.
    pub fn authenticated() -> Self {
        Self {
            need_auth: true,
            ..Default::default()
        }
    }

    /// A route restricted to admin consumers.
    pub fn admin() -> Self {
        Self {
            need_auth: true,
            need_admin: true,
            ..Default::default()
        }
    }

    pub fn with_permission(mut self, level: PermissionLevel) -> Self {
        self.permission = level;
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scope>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_static_token(mut self, token: StaticToken) -> Self {
        self.allowed_tokens.push(token);
        self
    }

    pub fn with_resource(mut self, resource: impl Into<ResourceKey>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

/// How the request ended up authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// Every configured static header matched.
    StaticToken,
    /// A verified session resolved to a consumer.
    Session,
    /// No credential, and the route did not need one.
    Anonymous,
}

/// A session that resolved to a consumer.
#[derive(Debug, Clone)]
pub struct Identity {
    pub session: Session,
    pub consumer: Consumer,
}

/// Accumulated result of the pipeline for one request.
///
/// Built stage by stage. A session and consumer can only be attached once
/// verified claims are present, and only for the session those claims name.
#[derive(Debug, Clone, Default)]
pub struct RequestAuthContext {
    claims: Option<VerifiedClaims>,
    token_source: Option<TokenSource>,
    identity: Option<Identity>,
    grant: Option<Grant>,
}

impl RequestAuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn attach_claims(&mut self, claims: VerifiedClaims, source: TokenSource) {
        self.claims = Some(claims);
        self.token_source = Some(source);
    }

    pub(crate) fn attach_identity(&mut self, session: Session, consumer: Consumer) -> AuthResult<()> {
        let Some(claims) = &self.claims else {
            return Err(AuthError::Unauthenticated);
        };
        if claims.session_id() != &session.id || session.consumer_id != consumer.id {
            return Err(AuthError::Unauthenticated);
        }
        self.identity = Some(Identity { session, consumer });
        Ok(())
    }

    pub(crate) fn grant(&mut self, grant: Grant) {
        self.grant = Some(grant);
    }

    pub fn claims(&self) -> Option<&VerifiedClaims> {
        self.claims.as_ref()
    }

    pub fn token_source(&self) -> Option<TokenSource> {
        self.token_source
    }

    pub fn session(&self) -> Option<&Session> {
        self.identity.as_ref().map(|i| &i.session)
    }

    pub fn consumer(&self) -> Option<&Consumer> {
        self.identity.as_ref().map(|i| &i.consumer)
    }

    /// Set only once the pipeline has authorized the request.
    pub fn granted_by(&self) -> Option<Grant> {
        self.grant
    }

    pub fn is_admin(&self) -> bool {
        self.consumer().is_some_and(Consumer::is_admin)
    }
}
