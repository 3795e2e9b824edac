use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};

use crate::auth::{DEFAULT_XSRF_TTL_SECONDS, JwtSessionCodec};
use crate::db::DatabaseConfig;

/// Session cookie carrying the signed token.
pub const DEFAULT_SESSION_COOKIE: &str = "jwt_token";
/// Response cookie carrying the current anti-forgery token.
pub const DEFAULT_XSRF_COOKIE: &str = "xsrf_token";
/// Request header the anti-forgery token must be echoed in.
pub const DEFAULT_XSRF_HEADER: &str = "X-XSRF-TOKEN";
/// Upper bound for the whole pipeline when the caller sets no deadline.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
/// Longest accepted anti-forgery token lifetime (30 days).
pub const MAX_XSRF_TTL_SECONDS: u64 = 30 * 24 * 3600;
/// Longest accepted request timeout (10 minutes).
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 10 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenAlgorithm {
    #[default]
    Hs512,
    Rs512,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default)]
    pub algorithm: TokenAlgorithm,
    /// Shared secret for HS512.
    #[serde(default)]
    pub secret: Option<String>,
    /// PEM private key for RS512.
    #[serde(default)]
    pub private_key_pem: Option<PathBuf>,
    /// PEM public key for RS512.
    #[serde(default)]
    pub public_key_pem: Option<PathBuf>,
    #[serde(default)]
    pub leeway_seconds: u64,
}

impl TokenConfig {
    pub fn build_codec(&self) -> anyhow::Result<JwtSessionCodec> {
        let codec = match self.algorithm {
            TokenAlgorithm::Hs512 => {
                let secret = self
                    .secret
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| anyhow::anyhow!("token.secret is required for hs512"))?;
                JwtSessionCodec::from_secret(secret.as_bytes())
            }
            TokenAlgorithm::Rs512 => {
                let (Some(private), Some(public)) = (&self.private_key_pem, &self.public_key_pem)
                else {
                    return Err(anyhow::anyhow!(
                        "token.private_key_pem and token.public_key_pem are required for rs512"
                    ));
                };
                JwtSessionCodec::from_rsa_pem(&fs::read(private)?, &fs::read(public)?)?
            }
        };
        Ok(codec.with_leeway(self.leeway_seconds))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    #[serde(default = "default_xsrf_cookie")]
    pub xsrf_cookie: String,
    #[serde(default = "default_xsrf_header")]
    pub xsrf_header: String,
    #[serde(default = "default_xsrf_ttl_seconds")]
    pub xsrf_ttl_seconds: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

fn default_session_cookie() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

fn default_xsrf_cookie() -> String {
    DEFAULT_XSRF_COOKIE.to_string()
}

fn default_xsrf_header() -> String {
    DEFAULT_XSRF_HEADER.to_string()
}

fn default_xsrf_ttl_seconds() -> u64 {
    DEFAULT_XSRF_TTL_SECONDS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            session_cookie: default_session_cookie(),
            xsrf_cookie: default_xsrf_cookie(),
            xsrf_header: default_xsrf_header(),
            xsrf_ttl_seconds: DEFAULT_XSRF_TTL_SECONDS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            token: TokenConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Config for HS512 session tokens with the given secret.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            token: TokenConfig {
                secret: Some(secret.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Parse a JSON config, expanding `${VAR}` references in string values.
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(raw)?;
        expand_value(&mut value);
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject lifetimes that are zero or too large to turn into deadlines
    /// and cookie expiry dates.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=MAX_XSRF_TTL_SECONDS).contains(&self.xsrf_ttl_seconds) {
            anyhow::bail!(
                "xsrf_ttl_seconds must be between 1 and {}, got {}",
                MAX_XSRF_TTL_SECONDS,
                self.xsrf_ttl_seconds
            );
        }
        if !(1..=MAX_REQUEST_TIMEOUT_MS).contains(&self.request_timeout_ms) {
            anyhow::bail!(
                "request_timeout_ms must be between 1 and {}, got {}",
                MAX_REQUEST_TIMEOUT_MS,
                self.request_timeout_ms
            );
        }
        Ok(())
    }
}

/// Path of the config file, if one exists.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("AUTHGATE_CONFIG") {
        return Some(PathBuf::from(p));
    }

    let candidate = PathBuf::from("authgate.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

/// Load the config file, or defaults when there is none.
pub fn load_gateway_config() -> anyhow::Result<GatewayConfig> {
    let Some(path) = resolve_config_path() else {
        return Ok(GatewayConfig::default());
    };
    let raw = fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
    GatewayConfig::from_json_str(&raw)
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}

fn expand_value(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => *s = expand_env_vars(s),
        serde_json::Value::Array(items) => items.iter_mut().for_each(expand_value),
        serde_json::Value::Object(map) => map.values_mut().for_each(expand_value),
        _ => {}
    }
}
