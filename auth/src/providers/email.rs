//! Email provider trait.

use crate::error::Result;
use chrono::{DateTime, Utc};

/// Email provider.
///
/// This trait abstracts over email delivery services. Message content and
/// templates belong to the implementation.
pub trait EmailProvider: Send + Sync {
    /// Send a password reset email.
    ///
    /// # Arguments
    ///
    /// - `to`: Recipient email address
    /// - `token`: Reset token
    /// - `base_url`: Link base (e.g. `https://app.example.com/reset-password`)
    /// - `expires_at`: Token expiration timestamp
    ///
    /// # Errors
    ///
    /// Returns error if the provider rejects the message.
    fn send_password_reset(
        &self,
        to: &str,
        token: &str,
        base_url: &str,
        expires_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Send an email verification message.
    ///
    /// # Errors
    ///
    /// Returns error if the provider rejects the message.
    fn send_verification_email(
        &self,
        to: &str,
        token: &str,
        base_url: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
