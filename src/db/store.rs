//! SurrealDB-backed session and consumer storage.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

use crate::auth::{AuthenticatedUser, BoxFuture, Consumer, ConsumerStore, Session, SessionStore};
use crate::db::Db;
use crate::types::{ConsumerId, Scope, SessionId};

/// Persisted session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Database identifier
    pub id: RecordId,
    pub session_id: String,
    pub consumer_id: String,
    pub created: i64,
    pub expire_at: i64,
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        Self {
            id: SessionId::new(record.session_id),
            consumer_id: ConsumerId::new(record.consumer_id),
            created: record.created,
            expire_at: record.expire_at,
        }
    }
}

/// Persisted consumer row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerRecord {
    /// Database identifier
    pub id: RecordId,
    pub consumer_id: String,
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub user: Option<AuthenticatedUser>,
}

impl From<ConsumerRecord> for Consumer {
    fn from(record: ConsumerRecord) -> Self {
        Self {
            id: ConsumerId::new(record.consumer_id),
            name: record.name,
            scopes: record.scopes.into_iter().map(Scope::new).collect(),
            user: record.user,
        }
    }
}

/// Session and consumer store on SurrealDB.
#[derive(Clone)]
pub struct SurrealAuthStore {
    db: Db,
}

impl SurrealAuthStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Get a session by its session id.
    pub async fn get_session(&self, session_id: &SessionId) -> Result<Option<Session>> {
        let query = r#"
            SELECT * FROM auth_session
            WHERE session_id = $session_id
            LIMIT 1
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("session_id", session_id.to_string()))
            .await?;

        let sessions: Vec<SessionRecord> = res.take(0)?;
        Ok(sessions.into_iter().next().map(Session::from))
    }

    /// Get a consumer by id, optionally dropping the linked user.
    pub async fn get_consumer(
        &self,
        consumer_id: &ConsumerId,
        with_linked_user: bool,
    ) -> Result<Option<Consumer>> {
        let query = r#"
            SELECT * FROM auth_consumer
            WHERE consumer_id = $consumer_id
            LIMIT 1
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("consumer_id", consumer_id.to_string()))
            .await?;

        let consumers: Vec<ConsumerRecord> = res.take(0)?;
        Ok(consumers.into_iter().next().map(|record| {
            let mut consumer = Consumer::from(record);
            if !with_linked_user {
                consumer.user = None;
            }
            consumer
        }))
    }

    /// Persist a new session.
    pub async fn insert_session(&self, session: &Session) -> Result<()> {
        let query = r#"
            CREATE auth_session CONTENT {
                session_id: $session_id,
                consumer_id: $consumer_id,
                created: $created,
                expire_at: $expire_at
            }
        "#;

        self.db
            .query(query)
            .bind(("session_id", session.id.to_string()))
            .bind(("consumer_id", session.consumer_id.to_string()))
            .bind(("created", session.created))
            .bind(("expire_at", session.expire_at))
            .await?
            .check()?;

        Ok(())
    }

    /// Persist a new consumer.
    pub async fn insert_consumer(&self, consumer: &Consumer) -> Result<()> {
        let query = r#"
            CREATE auth_consumer CONTENT {
                consumer_id: $consumer_id,
                name: $name,
                scopes: $scopes,
                user: $user
            }
        "#;

        let scopes: Vec<String> = consumer.scopes.iter().map(|s| s.to_string()).collect();

        self.db
            .query(query)
            .bind(("consumer_id", consumer.id.to_string()))
            .bind(("name", consumer.name.clone()))
            .bind(("scopes", scopes))
            .bind(("user", consumer.user.clone()))
            .await?
            .check()?;

        Ok(())
    }

    /// Remove a session (logout).
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        self.db
            .query("DELETE auth_session WHERE session_id = $session_id")
            .bind(("session_id", session_id.to_string()))
            .await?
            .check()?;

        Ok(())
    }
}

impl SessionStore for SurrealAuthStore {
    fn load_session<'a>(&'a self, id: &'a SessionId) -> BoxFuture<'a, Result<Option<Session>>> {
        Box::pin(self.get_session(id))
    }
}

impl ConsumerStore for SurrealAuthStore {
    fn load_consumer<'a>(
        &'a self,
        id: &'a ConsumerId,
        with_linked_user: bool,
    ) -> BoxFuture<'a, Result<Option<Consumer>>> {
        Box::pin(self.get_consumer(id, with_linked_user))
    }
}
