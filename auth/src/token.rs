//! Token issuance and verification.
//!
//! Every token is an HS256 JWT. Three shapes exist:
//!
//! | Shape | `type` | `requires_2fa` | Accepted by |
//! |---|---|---|---|
//! | Access | `access` | absent | [`Capability::Session`] |
//! | Partial | `access` | `true` (+ `device_id`) | [`Capability::TwoFactorVerification`] |
//! | Refresh | `refresh` | absent | [`Capability::Refresh`] |
//!
//! Inside the crate the partial flag is modelled as [`TokenScope`], so code
//! can never forget to check it: a verified token is only handed out for the
//! capability it was issued for.

use crate::config::TokenConfig;
use crate::crypto::random_urlsafe_token;
use crate::error::{AuthError, Result};
use crate::state::{AccountId, DeviceId};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

const ACCESS_TYPE: &str = "access";
const REFRESH_TYPE: &str = "refresh";

/// Token kind, the wire `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bearer token for API requests.
    Access,
    /// Rotating refresh material.
    Refresh,
}

/// What an access token is good for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenScope {
    /// Fully authenticated session.
    Session,
    /// Password accepted, second factor outstanding.
    PendingTwoFactor {
        /// Device the login originated from.
        device_id: DeviceId,
    },
}

/// What the caller wants to do with a presented token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Regular authenticated endpoints.
    Session,
    /// The second-factor verification endpoint.
    TwoFactorVerification,
    /// Refresh token rotation and logout.
    Refresh,
}

/// Verified token claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Token subject.
    pub account_id: AccountId,
    /// Access or refresh.
    pub kind: TokenKind,
    /// Scope (always [`TokenScope::Session`] for refresh material).
    pub scope: TokenScope,
    /// Unique token ID.
    pub jti: String,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
}

/// Wire representation.
#[derive(Debug, Serialize, Deserialize)]
struct RawClaims {
    sub: String,
    exp: i64,
    iat: i64,
    jti: String,
    #[serde(rename = "type")]
    token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requires_2fa: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
}

/// Signs and verifies tokens with the process secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    config: TokenConfig,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_token_ttl", &self.config.access_token_ttl)
            .field("partial_token_ttl", &self.config.partial_token_ttl)
            .field("refresh_token_ttl", &self.config.refresh_token_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Create an issuer.
    #[must_use]
    pub fn new(config: TokenConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret_key.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret_key.as_bytes()),
            config,
        }
    }

    /// Token lifetimes.
    #[must_use]
    pub const fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Sign a full-scope access token.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if signing fails.
    pub fn issue_access_token(&self, account_id: AccountId, ttl: Duration) -> Result<String> {
        self.sign(account_id, ACCESS_TYPE, ttl, random_urlsafe_token(16), None)
    }

    /// Sign a partial token that only unlocks second-factor verification.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if signing fails.
    pub fn issue_partial_token(
        &self,
        account_id: AccountId,
        device_id: &DeviceId,
    ) -> Result<String> {
        self.sign(
            account_id,
            ACCESS_TYPE,
            self.config.partial_token_ttl,
            random_urlsafe_token(16),
            Some(device_id),
        )
    }

    /// Sign refresh material. The random `jti` makes every value unique.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if signing fails.
    pub fn issue_refresh_material(&self, account_id: AccountId, ttl: Duration) -> Result<String> {
        self.sign(account_id, REFRESH_TYPE, ttl, random_urlsafe_token(32), None)
    }

    fn sign(
        &self,
        account_id: AccountId,
        token_type: &str,
        ttl: Duration,
        jti: String,
        pending_device: Option<&DeviceId>,
    ) -> Result<String> {
        let now = Utc::now();
        let claims = RawClaims {
            sub: account_id.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti,
            token_type: token_type.to_string(),
            requires_2fa: pending_device.map(|_| true),
            device_id: pending_device.map(ToString::to_string),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InternalError(format!("Token signing failed: {e}")))
    }

    /// Verify a token for a capability.
    ///
    /// # Errors
    ///
    /// - `TokenExpired`, `TokenSignatureInvalid`, `TokenMalformed` for tokens
    ///   that fail verification
    /// - `TokenMalformed` when an access token is presented as refresh
    ///   material or vice versa
    /// - `InsufficientScope` when an access token has the wrong scope
    pub fn verify(&self, token: &str, capability: Capability) -> Result<Claims> {
        let claims = self.decode(token)?;

        match (capability, claims.kind, &claims.scope) {
            (Capability::Session, TokenKind::Access, TokenScope::Session)
            | (
                Capability::TwoFactorVerification,
                TokenKind::Access,
                TokenScope::PendingTwoFactor { .. },
            )
            | (Capability::Refresh, TokenKind::Refresh, _) => Ok(claims),
            (Capability::Session | Capability::TwoFactorVerification, TokenKind::Access, _) => {
                tracing::warn!(
                    account_id = %claims.account_id,
                    ?capability,
                    "Token presented outside its scope"
                );
                Err(AuthError::InsufficientScope)
            }
            _ => Err(AuthError::TokenMalformed),
        }
    }

    fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<RawClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                ErrorKind::InvalidSignature => AuthError::TokenSignatureInvalid,
                _ => {
                    tracing::debug!(error = %e, "Token decode failed");
                    AuthError::TokenMalformed
                }
            })?;
        let raw = data.claims;

        let kind = match raw.token_type.as_str() {
            ACCESS_TYPE => TokenKind::Access,
            REFRESH_TYPE => TokenKind::Refresh,
            _ => return Err(AuthError::TokenMalformed),
        };

        let scope = match (kind, raw.requires_2fa, raw.device_id) {
            (TokenKind::Access, Some(true), Some(device_id)) => TokenScope::PendingTwoFactor {
                device_id: DeviceId(device_id),
            },
            (TokenKind::Access, Some(true), None) => return Err(AuthError::TokenMalformed),
            _ => TokenScope::Session,
        };

        Ok(Claims {
            account_id: raw.sub.parse()?,
            kind,
            scope,
            jti: raw.jti,
            issued_at: timestamp(raw.iat)?,
            expires_at: timestamp(raw.exp)?,
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or(AuthError::TokenMalformed)
}
