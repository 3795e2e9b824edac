//! Static shared-secret header tokens configured per route.

use std::fmt;
use std::str::FromStr;

use http::HeaderMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::auth::error::AuthError;

/// A `Header-Name:expected-value` pair.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticToken {
    header: String,
    value: String,
}

impl StaticToken {
    pub fn new(header: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            value: value.into(),
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    fn matches(&self, received: Option<&str>) -> bool {
        received.is_some_and(|r| secrets_match(r, &self.value))
    }
}

/// Compare two secrets by their SHA-256 digests, so the comparison time does
/// not depend on how much of the secret was guessed.
pub(crate) fn secrets_match(a: &str, b: &str) -> bool {
    Sha256::digest(a.as_bytes()) == Sha256::digest(b.as_bytes())
}

// Never print the secret.
impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticToken")
            .field("header", &self.header)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Error parsing a `Header-Name:value` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticTokenParseError(String);

impl fmt::Display for StaticTokenParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid static token entry: {}", self.0)
    }
}

impl std::error::Error for StaticTokenParseError {}

impl FromStr for StaticToken {
    type Err = StaticTokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (header, value) = s
            .split_once(':')
            .ok_or_else(|| StaticTokenParseError("expected `Header-Name:value`".to_string()))?;
        let header = header.trim();
        if header.is_empty() {
            return Err(StaticTokenParseError("empty header name".to_string()));
        }
        Ok(Self::new(header, value))
    }
}

impl Serialize for StaticToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}:{}", self.header, self.value))
    }
}

impl<'de> Deserialize<'de> for StaticToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Outcome of the static token check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticTokenOutcome {
    /// The route configures no static tokens.
    NotApplicable,
    /// Every configured pair matched.
    Granted,
}

/// Check every configured pair against the request headers.
///
/// All-or-nothing: the first missing or mismatching header is a denial
/// naming that header.
pub fn check_static_tokens(
    allowed: &[StaticToken],
    headers: &HeaderMap,
) -> Result<StaticTokenOutcome, AuthError> {
    if allowed.is_empty() {
        return Ok(StaticTokenOutcome::NotApplicable);
    }

    for token in allowed {
        debug!(header = %token.header(), "checking allowed static token");
        let received = headers
            .get(token.header())
            .and_then(|v| v.to_str().ok());
        if !token.matches(received) {
            return Err(AuthError::StaticTokenRejected {
                header: token.header().to_string(),
            });
        }
    }

    Ok(StaticTokenOutcome::Granted)
}
