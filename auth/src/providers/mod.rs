//! Authentication providers.
//!
//! This module defines traits for every external dependency of the auth
//! services (record stores, hashing, email, `OAuth` endpoints, rate-limit
//! backends) together with the records they exchange.
//!
//! Providers are **interfaces**, not implementations. Services are generic
//! over them; the application picks concrete implementations:
//!
//! - **Testing / single node**: in-memory `mocks` (feature `test-utils`)
//! - **Production**: `PostgreSQL` repositories and `Redis` stores in [`crate::stores`]
//!
//! All store operations that must be atomic say so on the trait method.

use crate::state::{AccountId, DeviceId, OAuthProvider};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

pub mod account;
pub mod console_email;
pub mod device;
pub mod email;
pub mod github;
pub mod google;
pub mod oauth;
pub mod password;
pub mod rate_limiter;
pub mod refresh_token;
pub mod token_store;
pub mod two_factor;

// Re-export provider traits
pub use account::AccountRepository;
pub use console_email::ConsoleEmailProvider;
pub use device::{DeviceRepository, LoginAttemptLog};
pub use email::EmailProvider;
pub use github::GitHubOAuthProvider;
pub use google::GoogleOAuthProvider;
pub use oauth::{HttpOAuthProviders, OAuth2Provider, OAuthTokenResponse};
pub use password::{Argon2Hasher, PasswordHasher};
pub use rate_limiter::{RateLimitDecision, RateLimiter};
pub use refresh_token::RefreshTokenStore;
pub use token_store::{TokenData, TokenStore, TokenType};
pub use two_factor::TwoFactorStore;

// ═══════════════════════════════════════════════════════════════════════
// Accounts
// ═══════════════════════════════════════════════════════════════════════

/// Account record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Account ID.
    pub id: AccountId,
    /// Unique email address.
    pub email: String,
    /// Unique username.
    pub username: String,
    /// Password hash (PHC string).
    pub password_hash: String,
    /// Display name.
    pub full_name: Option<String>,
    /// Unique phone number, if provided.
    pub phone: Option<String>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Email verified flag.
    pub is_verified: bool,
    /// Disabled accounts cannot authenticate.
    pub is_active: bool,
    /// Superuser flag.
    pub is_superuser: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
    /// Last successful login.
    pub last_login: Option<DateTime<Utc>>,
}

impl Account {
    /// A fresh, active, unverified account.
    #[must_use]
    pub fn new(email: String, username: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            email,
            username,
            password_hash,
            full_name: None,
            phone: None,
            avatar_url: None,
            is_verified: false,
            is_active: true,
            is_superuser: false,
            created_at: now,
            updated_at: now,
            last_login: None,
        }
    }

    /// Public projection without credential material.
    #[must_use]
    pub fn view(&self) -> AccountView {
        AccountView {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            phone: self.phone.clone(),
            avatar_url: self.avatar_url.clone(),
            is_verified: self.is_verified,
            is_active: self.is_active,
            is_superuser: self.is_superuser,
            created_at: self.created_at,
            last_login: self.last_login,
        }
    }
}

/// Account as returned to clients. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    /// Account ID.
    pub id: AccountId,
    /// Email address.
    pub email: String,
    /// Username.
    pub username: String,
    /// Display name.
    pub full_name: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Email verified flag.
    pub is_verified: bool,
    /// Active flag.
    pub is_active: bool,
    /// Superuser flag.
    pub is_superuser: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last successful login.
    pub last_login: Option<DateTime<Utc>>,
}

/// Registration input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    /// Email address.
    pub email: String,
    /// Username.
    pub username: String,
    /// Plaintext password.
    pub password: String,
    /// Display name.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Phone number.
    #[serde(default)]
    pub phone: Option<String>,
}

/// Profile update input; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    /// Display name.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub avatar_url: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Refresh Tokens
// ═══════════════════════════════════════════════════════════════════════

/// Persisted refresh token.
///
/// The token value itself is never stored; `token_hash` is its SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Record ID.
    pub id: uuid::Uuid,
    /// Hex SHA-256 of the token value.
    pub token_hash: String,
    /// Owning account.
    pub account_id: AccountId,
    /// Device descriptor (user agent, truncated).
    pub device_info: Option<String>,
    /// Source IP at issuance.
    pub ip_address: Option<String>,
    /// Cleared on revocation or rotation.
    pub is_active: bool,
    /// Issuance time.
    pub created_at: DateTime<Utc>,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
    /// Last time the token was presented.
    pub last_used_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    /// Active and not expired at `now`.
    #[must_use]
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at > now
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Two-Factor
// ═══════════════════════════════════════════════════════════════════════

/// Stored two-factor credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoFactorCredential {
    /// Owning account (unique).
    pub account_id: AccountId,
    /// AES-256-GCM sealed TOTP secret.
    pub encrypted_secret: String,
    /// Keyed digests of the unused backup codes.
    pub backup_codes: HashSet<String>,
    /// `false` while pending confirmation.
    pub is_enabled: bool,
    /// When the credential was confirmed.
    pub enabled_at: Option<DateTime<Utc>>,
    /// Last successful verification.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════
// Devices
// ═══════════════════════════════════════════════════════════════════════

/// Device form factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Phone.
    Mobile,
    /// Tablet.
    Tablet,
    /// Desktop or laptop.
    Desktop,
}

impl DeviceType {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Desktop => "desktop",
        }
    }
}

impl FromStr for DeviceType {
    type Err = crate::AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile" => Ok(Self::Mobile),
            "tablet" => Ok(Self::Tablet),
            "desktop" => Ok(Self::Desktop),
            other => Err(crate::AuthError::DatabaseError(format!(
                "Unknown device type: {other}"
            ))),
        }
    }
}

/// Device record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Fingerprint-derived device ID.
    pub id: DeviceId,
    /// Owning account.
    pub account_id: AccountId,
    /// Display name, `"{browser} on {os}"`.
    pub name: String,
    /// Form factor.
    pub device_type: DeviceType,
    /// Browser family.
    pub browser: String,
    /// Browser version.
    pub browser_version: String,
    /// OS family.
    pub os: String,
    /// OS version.
    pub os_version: String,
    /// Most recent source IP.
    pub ip_address: Option<String>,
    /// User-managed trust flag.
    pub is_trusted: bool,
    /// Most recent activity.
    pub last_active: DateTime<Utc>,
    /// First sighting.
    pub created_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════
// Login Attempts
// ═══════════════════════════════════════════════════════════════════════

/// Outcome recorded on a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    /// Full session issued.
    Success,
    /// Credentials or second factor rejected.
    Failed,
    /// Password accepted, second factor outstanding.
    #[serde(rename = "pending_2fa")]
    PendingTwoFactor,
    /// Rejected before verification (rate limit).
    Blocked,
}

impl LoginStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::PendingTwoFactor => "pending_2fa",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for LoginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginStatus {
    type Err = crate::AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "pending_2fa" => Ok(Self::PendingTwoFactor),
            "blocked" => Ok(Self::Blocked),
            other => Err(crate::AuthError::DatabaseError(format!(
                "Unknown login status: {other}"
            ))),
        }
    }
}

/// Immutable audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttempt {
    /// Row ID.
    pub id: uuid::Uuid,
    /// Account the attempt targeted.
    pub account_id: AccountId,
    /// Device, when one was resolved.
    pub device_id: Option<DeviceId>,
    /// Source IP.
    pub ip_address: String,
    /// User agent, truncated.
    pub user_agent: String,
    /// `"password"` or `"oauth_{provider}"`.
    pub login_method: String,
    /// Outcome.
    pub status: LoginStatus,
    /// Reason for `Failed`/`Blocked`.
    pub failure_reason: Option<String>,
    /// Attempt time.
    pub created_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════
// External Identities
// ═══════════════════════════════════════════════════════════════════════

/// Link between an account and a provider identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthLink {
    /// Link ID.
    pub id: uuid::Uuid,
    /// Provider.
    pub provider: OAuthProvider,
    /// Provider-side user ID.
    pub provider_user_id: String,
    /// Linked account.
    pub account_id: AccountId,
    /// Provider access token.
    pub access_token: Option<String>,
    /// Provider refresh token.
    pub refresh_token: Option<String>,
    /// Provider token expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last token refresh.
    pub updated_at: DateTime<Utc>,
}

/// Normalised provider profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthUserInfo {
    /// Provider-side user ID.
    pub provider_user_id: String,
    /// Email, if the provider disclosed one.
    pub email: Option<String>,
    /// Whether the provider verified the email.
    pub email_verified: bool,
    /// Display name.
    pub name: Option<String>,
    /// Avatar URL.
    pub picture: Option<String>,
}
