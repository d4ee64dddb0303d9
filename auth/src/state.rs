//! Identifier and session value types.
//!
//! These are the small, `Clone` types that flow between the services:
//! account and device identifiers, the request context captured at the edge,
//! and the token shapes returned to callers.

use crate::error::AuthError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Unique identifier for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub uuid::Uuid);

impl AccountId {
    /// Generate a new random `AccountId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for AccountId {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| AuthError::TokenMalformed)
    }
}

/// Deterministic device identifier.
///
/// A 32 character lowercase hex string derived from the parsed browser and
/// operating system of a user agent. See [`crate::devices::fingerprint`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// OAuth Providers
// ═══════════════════════════════════════════════════════════════════════

/// External identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    /// Google `OAuth`.
    Google,
    /// GitHub `OAuth`.
    #[serde(rename = "github")]
    GitHub,
}

impl OAuthProvider {
    /// Every provider this crate knows how to talk to.
    pub const ALL: [Self; 2] = [Self::Google, Self::GitHub];

    /// Get the provider name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
        }
    }

    /// Human readable provider name.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::GitHub => "GitHub",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::GitHub),
            _ => Err(AuthError::OAuthProviderUnknown(s.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Request Context
// ═══════════════════════════════════════════════════════════════════════

/// Caller facts captured at the edge and threaded through every flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Source IP address.
    pub ip_address: IpAddr,

    /// Raw `User-Agent` header ("Unknown" when absent).
    pub user_agent: String,
}

impl RequestContext {
    /// Create a new request context.
    #[must_use]
    pub fn new(ip_address: IpAddr, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address,
            user_agent: user_agent.into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Session Shapes
// ═══════════════════════════════════════════════════════════════════════

/// A full session: access token plus rotating refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived access token.
    pub access_token: String,

    /// Opaque refresh token, rotated on every use.
    pub refresh_token: String,

    /// Always `"bearer"`.
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

impl TokenPair {
    /// Create a bearer token pair.
    #[must_use]
    pub fn bearer(access_token: String, refresh_token: String, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in,
        }
    }
}

/// Partial authentication awaiting a second factor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTwoFactor {
    /// Access token scoped to the 2FA verification endpoint only.
    pub access_token: String,

    /// Always `true`; mirrored on the wire for clients.
    pub requires_2fa: bool,

    /// Device the login originated from.
    pub device_id: DeviceId,

    /// Always `"bearer"`.
    pub token_type: String,

    /// Partial token lifetime in seconds.
    pub expires_in: i64,
}

/// Result of a password login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LoginOutcome {
    /// Credentials accepted and no second factor required.
    Authenticated(TokenPair),

    /// Credentials accepted, second factor pending.
    TwoFactorPending(PendingTwoFactor),
}

impl LoginOutcome {
    /// Returns `true` when a second factor is still required.
    #[must_use]
    pub const fn requires_two_factor(&self) -> bool {
        matches!(self, Self::TwoFactorPending(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_generation() {
        let id1 = AccountId::new();
        let id2 = AccountId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_account_id_round_trips_through_display() {
        let id = AccountId::new();
        let parsed: AccountId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!("not-a-uuid".parse::<AccountId>(), Err(AuthError::TokenMalformed));
    }

    #[test]
    fn test_oauth_provider_str() {
        assert_eq!(OAuthProvider::Google.as_str(), "google");
        assert_eq!(OAuthProvider::GitHub.as_str(), "github");
        assert_eq!("GitHub".parse::<OAuthProvider>(), Ok(OAuthProvider::GitHub));
        assert!(matches!(
            "myspace".parse::<OAuthProvider>(),
            Err(AuthError::OAuthProviderUnknown(_))
        ));
    }

    #[test]
    fn test_pending_outcome_serializes_flag() {
        let outcome = LoginOutcome::TwoFactorPending(PendingTwoFactor {
            access_token: "partial".into(),
            requires_2fa: true,
            device_id: DeviceId("abc".into()),
            token_type: "bearer".into(),
            expires_in: 300,
        });

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["requires_2fa"], true);
        assert_eq!(json["device_id"], "abc");
        assert!(outcome.requires_two_factor());
    }
}
