//! Mock refresh token store for testing.

use super::lock;
use crate::error::{AuthError, Result};
use crate::providers::{RefreshTokenRecord, RefreshTokenStore};
use crate::state::AccountId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Mock refresh token store.
///
/// Rotation runs under a single lock, giving the same all-or-nothing
/// behaviour as the transactional `PostgreSQL` store.
#[derive(Debug, Clone, Default)]
pub struct MockRefreshTokenStore {
    records: Arc<Mutex<HashMap<String, RefreshTokenRecord>>>,
    fail_inserts: Arc<AtomicBool>,
}

impl MockRefreshTokenStore {
    /// Create a new mock refresh token store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `insert` fail with `DatabaseError` (for testing).
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Every stored record, active or not (for testing).
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the lock is poisoned.
    pub fn all_records(&self) -> Result<Vec<RefreshTokenRecord>> {
        Ok(lock(&self.records)?.values().cloned().collect())
    }
}

impl RefreshTokenStore for MockRefreshTokenStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AuthError::DatabaseError("Refresh token insert failed".into()));
        }
        lock(&self.records)?.insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>> {
        Ok(lock(&self.records)?.get(token_hash).cloned())
    }

    async fn touch(&self, token_hash: &str, at: DateTime<Utc>) -> Result<()> {
        if let Some(record) = lock(&self.records)?.get_mut(token_hash) {
            record.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn deactivate(&self, token_hash: &str) -> Result<bool> {
        let mut records = lock(&self.records)?;
        Ok(match records.get_mut(token_hash) {
            Some(record) if record.is_active => {
                record.is_active = false;
                true
            }
            _ => false,
        })
    }

    async fn deactivate_all(&self, account_id: AccountId) -> Result<u64> {
        let mut records = lock(&self.records)?;
        let mut count = 0;
        for record in records
            .values_mut()
            .filter(|r| r.account_id == account_id && r.is_active)
        {
            record.is_active = false;
            count += 1;
        }
        Ok(count)
    }

    async fn rotate(&self, old_hash: &str, successor: &RefreshTokenRecord) -> Result<bool> {
        let mut records = lock(&self.records)?;
        let now = Utc::now();

        let Some(old) = records.get_mut(old_hash) else {
            return Ok(false);
        };
        if !old.is_usable(now) {
            return Ok(false);
        }

        old.is_active = false;
        old.last_used_at = Some(now);
        records.insert(successor.token_hash.clone(), successor.clone());
        Ok(true)
    }

    async fn list_active(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>> {
        let mut active: Vec<_> = lock(&self.records)?
            .values()
            .filter(|r| r.account_id == account_id && r.is_usable(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut records = lock(&self.records)?;
        let before = records.len();
        records.retain(|_, r| r.expires_at > now);
        Ok((before - records.len()) as u64)
    }
}
