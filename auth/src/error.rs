//! Error types for authentication and session operations.

use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Error taxonomy for the credential and session subsystem.
///
/// Security-sensitive negative outcomes are deliberately coarse: an unknown
/// email and a wrong password both surface as [`AuthError::InvalidCredentials`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Credential Errors
    // ═══════════════════════════════════════════════════════════

    /// Unknown account, wrong password, or disabled account.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// An account already uses this email, username or phone number.
    #[error("An account with this {field} already exists")]
    DuplicateAccount {
        /// Which unique field collided ("email", "username" or "phone").
        field: String,
    },

    /// Input failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Password reset token is unknown, used, or expired.
    #[error("Invalid or expired password reset token")]
    InvalidResetToken,

    /// Email verification token is unknown, used, or expired.
    #[error("Invalid or expired verification token")]
    InvalidVerificationToken,

    /// Referenced account does not exist.
    #[error("Account not found")]
    AccountNotFound,

    // ═══════════════════════════════════════════════════════════
    // Rate Limiting
    // ═══════════════════════════════════════════════════════════

    /// Admission denied by the rate limiter.
    #[error("Too many requests, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until a retry can succeed (always at least 1).
        retry_after_secs: u64,
        /// Maximum requests allowed in the window.
        limit: u32,
        /// Window length in seconds.
        window_secs: u64,
    },

    // ═══════════════════════════════════════════════════════════
    // Token Errors
    // ═══════════════════════════════════════════════════════════

    /// Token signature is valid but the token is past its expiry.
    #[error("Token has expired")]
    TokenExpired,

    /// Refresh token was revoked, rotated, or never issued.
    #[error("Token has been revoked")]
    TokenRevoked,

    /// Token could not be decoded.
    #[error("Malformed token")]
    TokenMalformed,

    /// Token signature does not match the signing key.
    #[error("Invalid token signature")]
    TokenSignatureInvalid,

    /// Token is valid but not scoped for the requested capability.
    #[error("Token scope does not permit this operation")]
    InsufficientScope,

    // ═══════════════════════════════════════════════════════════
    // Two-Factor Errors
    // ═══════════════════════════════════════════════════════════

    /// A second factor must be presented to complete login.
    #[error("Two-factor authentication required")]
    TwoFactorRequired,

    /// TOTP or backup code did not match.
    #[error("Invalid two-factor code")]
    InvalidTwoFactorCode,

    /// Two-factor authentication is already enabled.
    #[error("Two-factor authentication is already enabled")]
    AlreadyEnabled,

    /// Two-factor authentication is not enabled (or not set up).
    #[error("Two-factor authentication is not enabled")]
    NotEnabled,

    // ═══════════════════════════════════════════════════════════
    // Device Errors
    // ═══════════════════════════════════════════════════════════

    /// Device does not exist for this account.
    #[error("Device not found")]
    DeviceNotFound,

    // ═══════════════════════════════════════════════════════════
    // OAuth Errors
    // ═══════════════════════════════════════════════════════════

    /// Provider is unknown or has no configured credentials.
    #[error("Unknown OAuth provider: {0}")]
    OAuthProviderUnknown(String),

    /// Provider exchange, profile fetch, or identity resolution failed.
    #[error("OAuth authentication failed: {0}")]
    OAuthFailure(String),

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Record store operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Encryption or decryption of data at rest failed.
    #[error("Encryption error: {0}")]
    EncryptionError(String),

    /// Internal error (should not be exposed to users).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Returns `true` if this error is due to caller input or state.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sentinel_auth::AuthError;
    /// assert!(AuthError::InvalidCredentials.is_user_error());
    /// assert!(!AuthError::InternalError("boom".into()).is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        !matches!(
            self,
            Self::DatabaseError(_) | Self::EncryptionError(_) | Self::InternalError(_)
        )
    }

    /// Returns `true` if this error should be audited as a security event.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sentinel_auth::AuthError;
    /// assert!(AuthError::TokenSignatureInvalid.is_security_issue());
    /// assert!(!AuthError::TokenExpired.is_security_issue());
    /// ```
    #[must_use]
    pub const fn is_security_issue(&self) -> bool {
        matches!(
            self,
            Self::TokenSignatureInvalid
                | Self::TokenRevoked
                | Self::InsufficientScope
                | Self::RateLimited { .. }
        )
    }

    /// Shorthand for [`AuthError::DuplicateAccount`].
    #[must_use]
    pub fn duplicate(field: &str) -> Self {
        Self::DuplicateAccount {
            field: field.to_string(),
        }
    }
}
