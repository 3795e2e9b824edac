//! Session and consumer records as loaded from the identity store.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::context::PermissionLevel;
use crate::types::{ConsumerId, ResourceKey, Scope, SessionId};

/// A server-tracked session. Immutable for the duration of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub consumer_id: ConsumerId,
    /// Creation time (unix seconds).
    pub created: i64,
    /// End of the validity window (unix seconds, exclusive).
    pub expire_at: i64,
}

impl Session {
    /// Create a session valid for `ttl_seconds` from now.
    pub fn new(id: SessionId, consumer_id: ConsumerId, ttl_seconds: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            id,
            consumer_id,
            created: now,
            expire_at: now + ttl_seconds,
        }
    }

    /// Whether the session is still inside its validity window at `now`.
    pub fn is_valid_at(&self, now: i64) -> bool {
        now < self.expire_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now().timestamp())
    }
}

/// Global privilege ring of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ring {
    Admin,
    Maintainer,
    User,
}

/// A permission granted on a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGrant {
    pub resource: ResourceKey,
    pub level: PermissionLevel,
}

/// The user linked to a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub username: String,
    pub ring: Ring,
    #[serde(default)]
    pub grants: Vec<ResourceGrant>,
}

impl AuthenticatedUser {
    pub fn new(username: impl Into<String>, ring: Ring) -> Self {
        Self {
            username: username.into(),
            ring,
            grants: Vec::new(),
        }
    }

    pub fn with_grant(mut self, resource: impl Into<ResourceKey>, level: PermissionLevel) -> Self {
        self.grants.push(ResourceGrant {
            resource: resource.into(),
            level,
        });
        self
    }

    /// Highest level granted on `resource`, if any.
    pub fn level_on(&self, resource: &ResourceKey) -> Option<PermissionLevel> {
        self.grants
            .iter()
            .filter(|g| &g.resource == resource)
            .map(|g| g.level)
            .max()
    }
}

/// The identity a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    pub id: ConsumerId,
    pub name: String,
    /// Granted scopes. Empty means unrestricted.
    #[serde(default)]
    pub scopes: BTreeSet<Scope>,
    /// Linked user; only populated when loaded with linked identity.
    #[serde(default)]
    pub user: Option<AuthenticatedUser>,
}

impl Consumer {
    pub fn new(id: ConsumerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            scopes: BTreeSet::new(),
            user: None,
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Scope>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_user(mut self, user: AuthenticatedUser) -> Self {
        self.user = Some(user);
        self
    }

    /// A consumer is admin iff its linked user sits on the admin ring.
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.ring == Ring::Admin)
    }

    pub fn is_maintainer(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.ring == Ring::Maintainer)
    }
}
