use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL")
                .unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE")
                .unwrap_or_else(|_| "authgate".to_string()),
            database: env::var("SURREALDB_DATABASE")
                .unwrap_or_else(|_| "auth".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = vec![
        // Sessions referenced by signed session tokens
        "DEFINE TABLE auth_session SCHEMALESS;
         DEFINE FIELD session_id ON TABLE auth_session TYPE string;
         DEFINE FIELD consumer_id ON TABLE auth_session TYPE string;
         DEFINE FIELD created ON TABLE auth_session TYPE int;
         DEFINE FIELD expire_at ON TABLE auth_session TYPE int;",

        // Consumers and their linked users
        "DEFINE TABLE auth_consumer SCHEMALESS;
         DEFINE FIELD consumer_id ON TABLE auth_consumer TYPE string;
         DEFINE FIELD name ON TABLE auth_consumer TYPE string;
         DEFINE FIELD scopes ON TABLE auth_consumer TYPE array<string>;",

        "DEFINE INDEX auth_session_id ON TABLE auth_session COLUMNS session_id UNIQUE;
         DEFINE INDEX auth_session_consumer ON TABLE auth_session COLUMNS consumer_id;
         DEFINE INDEX auth_consumer_id ON TABLE auth_consumer COLUMNS consumer_id UNIQUE;",
    ];

    for query in schema_queries {
        db.query(query).await?;
    }

    Ok(())
}
