//! One-time token store trait.
//!
//! Password reset tokens, email verification tokens and `OAuth` `CSRF` states
//! share a single store with atomic single-use semantics.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    /// Password reset link token.
    PasswordReset,

    /// Email address verification token.
    EmailVerification,

    /// `OAuth` `CSRF` state parameter.
    OAuthState,
}

/// Token data stored in the token store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenData {
    /// Token type.
    pub token_type: TokenType,

    /// Token value.
    pub token: String,

    /// Associated data (account id for resets, provider for `OAuth` states).
    pub data: serde_json::Value,

    /// Expiration time.
    pub expires_at: DateTime<Utc>,

    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl TokenData {
    /// Create new token data.
    #[must_use]
    pub fn new(
        token_type: TokenType,
        token: String,
        data: serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token_type,
            token,
            data,
            expires_at,
            created_at: Utc::now(),
        }
    }

    /// Whether the token has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Token store.
///
/// # Security Requirements
///
/// 1. `consume_token()` atomically checks and deletes (`GETDEL` on Redis,
///    mutex-protected check-and-delete in memory)
/// 2. A consumed token can never be consumed again
/// 3. Expired tokens are rejected
/// 4. Token comparison is constant-time
pub trait TokenStore: Send + Sync {
    /// Store a token under `token_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn store_token(
        &self,
        token_id: &str,
        token_data: TokenData,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Consume a token atomically.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(TokenData))`: token was valid, not expired, and is now gone
    /// - `Ok(None)`: token not found, expired, or value mismatch
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn consume_token(
        &self,
        token_id: &str,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Option<TokenData>>> + Send;

    /// Read a token without consuming it.
    ///
    /// Used to pre-validate a reset link before the user submits a new password.
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn peek_token(
        &self,
        token_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<TokenData>>> + Send;

    /// Delete a token without returning it.
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn delete_token(
        &self,
        token_id: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Delete tokens expired at `now`.
    ///
    /// Stores with native expiry may return `0`.
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64>> + Send;
}
