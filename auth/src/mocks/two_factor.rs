//! Mock two-factor credential store for testing.

use super::lock;
use crate::error::{AuthError, Result};
use crate::providers::{TwoFactorCredential, TwoFactorStore};
use crate::state::AccountId;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Mock two-factor store.
#[derive(Debug, Clone, Default)]
pub struct MockTwoFactorStore {
    credentials: Arc<Mutex<HashMap<AccountId, TwoFactorCredential>>>,
}

impl MockTwoFactorStore {
    /// Create a new mock two-factor store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TwoFactorStore for MockTwoFactorStore {
    async fn get(&self, account_id: AccountId) -> Result<Option<TwoFactorCredential>> {
        Ok(lock(&self.credentials)?.get(&account_id).cloned())
    }

    async fn save_pending(&self, credential: &TwoFactorCredential) -> Result<()> {
        let mut credentials = lock(&self.credentials)?;

        if credentials
            .get(&credential.account_id)
            .is_some_and(|c| c.is_enabled)
        {
            return Err(AuthError::AlreadyEnabled);
        }

        let mut pending = credential.clone();
        pending.is_enabled = false;
        pending.enabled_at = None;
        credentials.insert(pending.account_id, pending);
        Ok(())
    }

    async fn mark_enabled(
        &self,
        account_id: AccountId,
        sealed_secret: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut credentials = lock(&self.credentials)?;
        Ok(match credentials.get_mut(&account_id) {
            Some(c) if !c.is_enabled && c.encrypted_secret == sealed_secret => {
                c.is_enabled = true;
                c.enabled_at = Some(at);
                true
            }
            _ => false,
        })
    }

    async fn delete(&self, account_id: AccountId) -> Result<bool> {
        Ok(lock(&self.credentials)?.remove(&account_id).is_some())
    }

    async fn consume_backup_code(&self, account_id: AccountId, code_digest: &str) -> Result<bool> {
        let mut credentials = lock(&self.credentials)?;
        Ok(credentials
            .get_mut(&account_id)
            .filter(|c| c.is_enabled)
            .is_some_and(|c| c.backup_codes.remove(code_digest)))
    }

    async fn replace_backup_codes(
        &self,
        account_id: AccountId,
        code_digests: HashSet<String>,
    ) -> Result<bool> {
        let mut credentials = lock(&self.credentials)?;
        Ok(match credentials.get_mut(&account_id) {
            Some(c) if c.is_enabled => {
                c.backup_codes = code_digests;
                true
            }
            _ => false,
        })
    }

    async fn touch(&self, account_id: AccountId, at: DateTime<Utc>) -> Result<()> {
        if let Some(c) = lock(&self.credentials)?.get_mut(&account_id) {
            c.last_used_at = Some(at);
        }
        Ok(())
    }
}
