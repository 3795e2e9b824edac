//! Signed session tokens carried in a cookie or a bearer header.

use chrono::Utc;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::cookies::cookie_value;
use crate::auth::error::TokenError;
use crate::auth::models::Session;
use crate::types::{ConsumerId, SessionId};

/// Where the raw token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// The session cookie. Subject to anti-forgery checks.
    Cookie,
    /// `Authorization: Bearer`. Never subject to anti-forgery checks.
    Header,
}

impl TokenSource {
    pub fn is_cookie(&self) -> bool {
        matches!(self, Self::Cookie)
    }
}

/// The signature-checked payload of a session token.
///
/// Only produced by a [`TokenVerifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    session_id: SessionId,
    consumer_id: Option<ConsumerId>,
    issued_at: i64,
    expires_at: i64,
}

impl VerifiedClaims {
    pub(crate) fn new(
        session_id: SessionId,
        consumer_id: Option<ConsumerId>,
        issued_at: i64,
        expires_at: i64,
    ) -> Self {
        Self {
            session_id,
            consumer_id,
            issued_at,
            expires_at,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Consumer named in the token. Informational; the session is authoritative.
    pub fn consumer_id(&self) -> Option<&ConsumerId> {
        self.consumer_id.as_ref()
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }
}

/// Verifies a raw session token.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, raw: &str) -> Result<VerifiedClaims, TokenError>;
}

/// JWT claims of a session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionJwtClaims {
    /// Session ID
    pub jti: String,
    /// Consumer ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Signs and verifies session JWTs.
pub struct JwtSessionCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    leeway_seconds: u64,
}

impl JwtSessionCodec {
    /// HS512 with a shared secret.
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            algorithm: Algorithm::HS512,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            leeway_seconds: 0,
        }
    }

    /// RS512 with a PEM key pair.
    pub fn from_rsa_pem(private_pem: &[u8], public_pem: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            algorithm: Algorithm::RS512,
            encoding_key: EncodingKey::from_rsa_pem(private_pem)?,
            decoding_key: DecodingKey::from_rsa_pem(public_pem)?,
            leeway_seconds: 0,
        })
    }

    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    /// Issue a token for `session`, expiring with it.
    pub fn sign(&self, session: &Session) -> anyhow::Result<String> {
        let claims = SessionJwtClaims {
            jti: session.id.to_string(),
            sub: Some(session.consumer_id.to_string()),
            iat: Utc::now().timestamp(),
            exp: session.expire_at,
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?;
        Ok(token)
    }
}

impl TokenVerifier for JwtSessionCodec {
    fn verify(&self, raw: &str) -> Result<VerifiedClaims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = self.leeway_seconds;
        validation.set_required_spec_claims(&["exp"]);

        let data = decode::<SessionJwtClaims>(raw, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed(e.to_string()),
            },
        )?;

        let claims = data.claims;
        if claims.jti.is_empty() {
            return Err(TokenError::Malformed("empty session id".to_string()));
        }

        Ok(VerifiedClaims::new(
            SessionId::new(claims.jti),
            claims.sub.map(ConsumerId::new),
            claims.iat,
            claims.exp,
        ))
    }
}

/// Locate the raw token: the session cookie first, then a bearer header.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<(String, TokenSource)> {
    if let Some(raw) = cookie_value(headers, cookie_name) {
        return Some((raw, TokenSource::Cookie));
    }

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| (t.to_string(), TokenSource::Header))
}

/// Extract and verify the session token.
///
/// `Ok(None)` means no credential was presented, which is not an error at
/// this stage.
pub fn authenticate_session_token(
    verifier: &dyn TokenVerifier,
    headers: &HeaderMap,
    cookie_name: &str,
) -> Result<Option<(VerifiedClaims, TokenSource)>, TokenError> {
    let Some((raw, source)) = extract_token(headers, cookie_name) else {
        debug!("no session token presented");
        return Ok(None);
    };

    let claims = verifier.verify(&raw)?;
    debug!(session_id = %claims.session_id(), ?source, "session token verified");
    Ok(Some((claims, source)))
}
