//! Mock email provider for testing.

use super::lock;
use crate::error::{AuthError, Result};
use crate::providers::EmailProvider;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Kind of message the mock captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    /// Password reset link.
    PasswordReset,
    /// Email verification link.
    Verification,
}

/// A captured message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    /// Message kind.
    pub kind: EmailKind,
    /// Recipient.
    pub to: String,
    /// Token embedded in the link.
    pub token: String,
}

/// Mock email provider.
///
/// Records every message instead of sending it, so tests can pick up the
/// tokens a user would have received.
#[derive(Debug, Clone)]
pub struct MockEmailProvider {
    /// Whether to simulate success or failure.
    pub should_succeed: bool,
    sent: Arc<Mutex<Vec<SentEmail>>>,
}

impl MockEmailProvider {
    /// Create a new mock email provider that succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            should_succeed: true,
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that rejects every message.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            should_succeed: false,
            ..Self::new()
        }
    }

    /// Every captured message (for testing).
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the lock is poisoned.
    pub fn sent(&self) -> Result<Vec<SentEmail>> {
        Ok(lock(&self.sent)?.clone())
    }

    /// Token of the newest message of `kind` sent to `to`.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the lock is poisoned.
    pub fn last_token(&self, to: &str, kind: EmailKind) -> Result<Option<String>> {
        Ok(lock(&self.sent)?
            .iter()
            .rev()
            .find(|m| m.kind == kind && m.to == to)
            .map(|m| m.token.clone()))
    }

    fn record(
        &self,
        kind: EmailKind,
        to: &str,
        token: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        let sent = Arc::clone(&self.sent);
        let should_succeed = self.should_succeed;
        let message = SentEmail {
            kind,
            to: to.to_string(),
            token: token.to_string(),
        };

        async move {
            if !should_succeed {
                return Err(AuthError::InternalError("Email delivery failed".into()));
            }
            lock(&sent)?.push(message);
            Ok(())
        }
    }
}

impl Default for MockEmailProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EmailProvider for MockEmailProvider {
    fn send_password_reset(
        &self,
        to: &str,
        token: &str,
        _base_url: &str,
        _expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send {
        self.record(EmailKind::PasswordReset, to, token)
    }

    fn send_verification_email(
        &self,
        to: &str,
        token: &str,
        _base_url: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        self.record(EmailKind::Verification, to, token)
    }
}
