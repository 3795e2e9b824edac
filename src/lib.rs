// Core modules
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod types;

// Re-export key types and functions
pub use auth::{AuthError, AuthGateway, Decision, RequestAuthContext, RouteRequirements};
pub use config::{GatewayConfig, TokenAlgorithm, TokenConfig, load_gateway_config};
pub use db::{DatabaseConfig, SurrealAuthStore, create_connection, ensure_schema};
pub use types::{ConsumerId, ResourceKey, Scope, SessionId};
