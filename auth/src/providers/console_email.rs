//! Console email provider for development.

use crate::error::Result;
use crate::providers::EmailProvider;
use chrono::{DateTime, Utc};
use tracing::info;

/// Email provider that writes messages to the log instead of sending them.
///
/// Tokens appear in the log output, so never use it in production.
#[derive(Clone, Debug, Default)]
pub struct ConsoleEmailProvider;

impl ConsoleEmailProvider {
    /// Create a new console email provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EmailProvider for ConsoleEmailProvider {
    async fn send_password_reset(
        &self,
        to: &str,
        token: &str,
        base_url: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let expires_minutes = (expires_at - Utc::now()).num_minutes();

        info!(
            to = %to,
            link = %format!("{base_url}?token={token}"),
            expires_in_minutes = expires_minutes,
            "Password reset email (development mode)"
        );

        Ok(())
    }

    async fn send_verification_email(&self, to: &str, token: &str, base_url: &str) -> Result<()> {
        info!(
            to = %to,
            link = %format!("{base_url}?token={token}"),
            "Verification email (development mode)"
        );

        Ok(())
    }
}
