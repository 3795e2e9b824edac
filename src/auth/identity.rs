//! Resolving verified claims to a session and its consumer.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::auth::BoxFuture;
use crate::auth::deadline::within;
use crate::auth::error::{AuthError, AuthResult};
use crate::auth::models::{Consumer, Session};
use crate::auth::session_token::VerifiedClaims;
use crate::types::{ConsumerId, SessionId};

/// Loads sessions by id. `Ok(None)` is "not found".
pub trait SessionStore: Send + Sync {
    fn load_session<'a>(&'a self, id: &'a SessionId)
    -> BoxFuture<'a, anyhow::Result<Option<Session>>>;
}

/// Loads consumers by id, optionally with their linked user.
pub trait ConsumerStore: Send + Sync {
    fn load_consumer<'a>(
        &'a self,
        id: &'a ConsumerId,
        with_linked_user: bool,
    ) -> BoxFuture<'a, anyhow::Result<Option<Consumer>>>;
}

/// In-process session and consumer store.
#[derive(Clone, Default)]
pub struct MemoryAuthStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    consumers: Arc<RwLock<HashMap<ConsumerId, Consumer>>>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_session(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    pub async fn insert_consumer(&self, consumer: Consumer) {
        self.consumers
            .write()
            .await
            .insert(consumer.id.clone(), consumer);
    }

    pub async fn remove_session(&self, id: &SessionId) -> Option<Session> {
        self.sessions.write().await.remove(id)
    }
}

impl SessionStore for MemoryAuthStore {
    fn load_session<'a>(
        &'a self,
        id: &'a SessionId,
    ) -> BoxFuture<'a, anyhow::Result<Option<Session>>> {
        Box::pin(async move { Ok(self.sessions.read().await.get(id).cloned()) })
    }
}

impl ConsumerStore for MemoryAuthStore {
    fn load_consumer<'a>(
        &'a self,
        id: &'a ConsumerId,
        with_linked_user: bool,
    ) -> BoxFuture<'a, anyhow::Result<Option<Consumer>>> {
        Box::pin(async move {
            let consumer = self.consumers.read().await.get(id).cloned();
            Ok(consumer.map(|mut c| {
                if !with_linked_user {
                    c.user = None;
                }
                c
            }))
        })
    }
}

/// Loads the session named by verified claims, then its consumer.
pub struct IdentityResolver {
    sessions: Arc<dyn SessionStore>,
    consumers: Arc<dyn ConsumerStore>,
}

impl IdentityResolver {
    pub fn new(sessions: Arc<dyn SessionStore>, consumers: Arc<dyn ConsumerStore>) -> Self {
        Self {
            sessions,
            consumers,
        }
    }

    /// One session read and one consumer read. Store failures are logged in
    /// full and reported as [`AuthError::Store`].
    pub async fn resolve(
        &self,
        claims: &VerifiedClaims,
        deadline: Instant,
    ) -> AuthResult<(Session, Consumer)> {
        let session_id = claims.session_id();

        let session = within(deadline, "load_session", self.sessions.load_session(session_id))
            .await?
            .map_err(|e| {
                error!(session_id = %session_id, "failed to load session: {:#}", e);
                AuthError::Store(e.to_string())
            })?
            .ok_or_else(|| {
                warn!(session_id = %session_id, "session not found");
                AuthError::SessionNotFound(session_id.clone())
            })?;

        if !session.is_valid_at(Utc::now().timestamp()) {
            warn!(session_id = %session_id, expire_at = session.expire_at, "session expired");
            return Err(AuthError::SessionExpired(session_id.clone()));
        }
        debug!(session_id = %session_id, consumer_id = %session.consumer_id, "session loaded");

        let consumer_id = &session.consumer_id;
        let consumer = within(
            deadline,
            "load_consumer",
            self.consumers.load_consumer(consumer_id, true),
        )
        .await?
        .map_err(|e| {
            error!(consumer_id = %consumer_id, "failed to load consumer: {:#}", e);
            AuthError::Store(e.to_string())
        })?
        .ok_or_else(|| {
            warn!(consumer_id = %consumer_id, "consumer not found");
            AuthError::ConsumerNotFound(consumer_id.clone())
        })?;

        info!(
            session_id = %session.id,
            consumer_id = %consumer.id,
            "identity resolved"
        );
        Ok((session, consumer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{AuthenticatedUser, Ring};
    use std::time::Duration;

    struct FailingStore;

    impl SessionStore for FailingStore {
        fn load_session<'a>(
            &'a self,
            _id: &'a SessionId,
        ) -> BoxFuture<'a, anyhow::Result<Option<Session>>> {
            Box::pin(async { Err(anyhow::anyhow!("connection refused")) })
        }
    }

    impl ConsumerStore for FailingStore {
        fn load_consumer<'a>(
            &'a self,
            _id: &'a ConsumerId,
            _with_linked_user: bool,
        ) -> BoxFuture<'a, anyhow::Result<Option<Consumer>>> {
            Box::pin(async { Err(anyhow::anyhow!("connection refused")) })
        }
    }

    struct SlowStore;

    impl SessionStore for SlowStore {
        fn load_session<'a>(
            &'a self,
            _id: &'a SessionId,
        ) -> BoxFuture<'a, anyhow::Result<Option<Session>>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(None)
            })
        }
    }

    fn claims(id: &str) -> VerifiedClaims {
        VerifiedClaims::new(SessionId::new(id), None, 0, i64::MAX)
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    async fn seeded() -> MemoryAuthStore {
        let store = MemoryAuthStore::new();
        store
            .insert_session(Session::new(SessionId::new("s1"), ConsumerId::new("c1"), 600))
            .await;
        store
            .insert_consumer(
                Consumer::new(ConsumerId::new("c1"), "alice")
                    .with_user(AuthenticatedUser::new("alice", Ring::User)),
            )
            .await;
        store
    }

    fn resolver(store: &MemoryAuthStore) -> IdentityResolver {
        IdentityResolver::new(Arc::new(store.clone()), Arc::new(store.clone()))
    }

    #[tokio::test]
    async fn test_resolve_loads_linked_user() {
        let store = seeded().await;
        let (session, consumer) = resolver(&store).resolve(&claims("s1"), deadline()).await.unwrap();
        assert_eq!(session.id.as_str(), "s1");
        assert_eq!(consumer.id.as_str(), "c1");
        assert!(consumer.user.is_some());
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let store = seeded().await;
        let resolver = resolver(&store);
        let first = resolver.resolve(&claims("s1"), deadline()).await.unwrap();
        let second = resolver.resolve(&claims("s1"), deadline()).await.unwrap();
        assert_eq!(first.0.id, second.0.id);
        assert_eq!(first.1.id, second.1.id);
    }

    #[tokio::test]
    async fn test_missing_session() {
        let store = seeded().await;
        let err = resolver(&store).resolve(&claims("nope"), deadline()).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_expired_session() {
        let store = seeded().await;
        store
            .insert_session(Session::new(SessionId::new("old"), ConsumerId::new("c1"), -10))
            .await;
        let err = resolver(&store).resolve(&claims("old"), deadline()).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionExpired(_)));
    }

    #[tokio::test]
    async fn test_missing_consumer() {
        let store = seeded().await;
        store
            .insert_session(Session::new(SessionId::new("orphan"), ConsumerId::new("gone"), 600))
            .await;
        let err = resolver(&store).resolve(&claims("orphan"), deadline()).await.unwrap_err();
        assert!(matches!(err, AuthError::ConsumerNotFound(_)));
    }

    #[tokio::test]
    async fn test_store_failure_is_wrapped() {
        let resolver = IdentityResolver::new(Arc::new(FailingStore), Arc::new(FailingStore));
        let err = resolver.resolve(&claims("s1"), deadline()).await.unwrap_err();
        assert!(matches!(err, AuthError::Store(ref msg) if msg.contains("connection refused")));
        assert_eq!(err.kind(), crate::auth::DenialKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_slow_store_hits_deadline() {
        let store = seeded().await;
        let resolver = IdentityResolver::new(Arc::new(SlowStore), Arc::new(store));
        let deadline = Instant::now() + Duration::from_millis(20);
        let err = resolver.resolve(&claims("s1"), deadline).await.unwrap_err();
        assert!(matches!(err, AuthError::Timeout));
    }

    #[tokio::test]
    async fn test_load_without_linked_user() {
        let store = seeded().await;
        let consumer = store
            .load_consumer(&ConsumerId::new("c1"), false)
            .await
            .unwrap()
            .unwrap();
        assert!(consumer.user.is_none());
    }
}
