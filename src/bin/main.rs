use anyhow::Result;
use authgate::auth::{
    AuthenticatedUser, Consumer, MemoryCache, Ring, Session, SessionStore, StaticToken,
};
use authgate::{AuthGateway, ConsumerId, SessionId, SurrealAuthStore, load_gateway_config};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

const XSRF_PURGE_INTERVAL_SECS: u64 = 60;

#[derive(Parser)]
#[command(name = "authgate")]
#[command(about = "Request authentication and authorization gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server with the auth gateway in front of its routes
    Serve {
        /// Bind address, e.g. 0.0.0.0:8080
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
        /// Overrides the database url from the config file
        #[arg(long)]
        db_url: Option<String>,
        /// HS512 signing secret, overrides token.secret from the config file
        #[arg(long, env = "AUTHGATE_TOKEN_SECRET")]
        secret: Option<String>,
        /// Static token for GET /status, as `Header:value`
        #[arg(long, env = "AUTHGATE_STATUS_TOKEN")]
        status_token: Option<StaticToken>,
    },
    /// Initialize the database
    Init {
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Create a session for a consumer and print its signed token
    IssueSession {
        /// Consumer id; created when it doesn't exist yet
        consumer_id: String,
        /// Display name for a newly created consumer
        #[arg(long)]
        name: Option<String>,
        /// Session lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: i64,
        /// Link the new consumer to an admin user
        #[arg(long, default_value_t = false)]
        admin: bool,
        /// Comma-separated scopes for a newly created consumer
        #[arg(long)]
        scopes: Option<String>,
        #[arg(long, default_value = "memory")]
        db_url: String,
        #[arg(long, env = "AUTHGATE_TOKEN_SECRET")]
        secret: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("authgate=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let mut config = load_gateway_config()?;

    match cli.command {
        Commands::Serve {
            bind,
            db_url,
            secret,
            status_token,
        } => {
            if let Some(url) = db_url {
                config.database.url = url;
            }
            if secret.is_some() {
                config.token.secret = secret;
            }
            info!("Using database url for server: {}", config.database.url);

            let db = authgate::create_connection(config.database.clone()).await?;
            authgate::ensure_schema(&db).await?;
            let store = Arc::new(SurrealAuthStore::new(db));
            let codec = config.token.build_codec()?;

            let cache = MemoryCache::new();
            cache.spawn_purge(Duration::from_secs(XSRF_PURGE_INTERVAL_SECS));

            let gateway = Arc::new(AuthGateway::new(
                &config,
                Arc::new(codec),
                store.clone(),
                store.clone(),
                Arc::new(cache),
            ));
            let sessions: Arc<dyn SessionStore> = store;
            let app = authgate::api::create_router(gateway, sessions, status_token);

            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Server listening on http://{}", bind);
            axum::serve(listener, app).await?;
        }
        Commands::Init { db_url } => {
            config.database.url = db_url;
            info!("Using database url for initialization: {}", config.database.url);

            info!("Initializing database...");
            let db = authgate::create_connection(config.database).await?;
            authgate::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
        Commands::IssueSession {
            consumer_id,
            name,
            ttl,
            admin,
            scopes,
            db_url,
            secret,
        } => {
            config.database.url = db_url;
            if secret.is_some() {
                config.token.secret = secret;
            }
            let db = authgate::create_connection(config.database.clone()).await?;
            authgate::ensure_schema(&db).await?;
            let store = SurrealAuthStore::new(db);
            let codec = config.token.build_codec()?;

            let consumer_id = ConsumerId::new(consumer_id);
            if store.get_consumer(&consumer_id, false).await?.is_none() {
                let name = name.unwrap_or_else(|| consumer_id.to_string());
                let ring = if admin { Ring::Admin } else { Ring::User };
                let scopes = scopes
                    .map(|s| {
                        s.split(',')
                            .map(|scope| scope.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();

                let consumer = Consumer::new(consumer_id.clone(), name.clone())
                    .with_scopes(scopes)
                    .with_user(AuthenticatedUser::new(name, ring));
                store.insert_consumer(&consumer).await?;
                info!("Created consumer {}", consumer_id);
            }

            let session = Session::new(
                SessionId::new(uuid::Uuid::new_v4().to_string()),
                consumer_id,
                ttl,
            );
            store.insert_session(&session).await?;
            let token = codec.sign(&session)?;

            println!("Session created successfully!");
            println!();
            println!("  Session: {}", session.id);
            println!("  Consumer: {}", session.consumer_id);
            if let Some(exp) = chrono::DateTime::from_timestamp(session.expire_at, 0) {
                println!("  Expires: {}", exp.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!();
            println!("Use with: -H 'Authorization: Bearer {}'", token);
        }
    }

    Ok(())
}
