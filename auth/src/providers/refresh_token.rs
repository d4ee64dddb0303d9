//! Refresh token store trait.

use crate::error::Result;
use crate::providers::RefreshTokenRecord;
use crate::state::AccountId;
use chrono::{DateTime, Utc};

/// Persistent refresh token records, keyed by token digest.
///
/// # Security Requirements
///
/// 1. **Atomic rotation**: [`RefreshTokenStore::rotate`] deactivates the
///    predecessor and inserts the successor as one unit.
/// 2. **Replay**: rotating an inactive predecessor commits nothing.
pub trait RefreshTokenStore: Send + Sync {
    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn insert(
        &self,
        record: &RefreshTokenRecord,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Find a record by token digest, regardless of state.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn find(
        &self,
        token_hash: &str,
    ) -> impl std::future::Future<Output = Result<Option<RefreshTokenRecord>>> + Send;

    /// Update `last_used_at`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn touch(
        &self,
        token_hash: &str,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Deactivate one record.
    ///
    /// # Returns
    ///
    /// `true` if an active record was deactivated.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn deactivate(
        &self,
        token_hash: &str,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Deactivate every active record of an account.
    ///
    /// # Returns
    ///
    /// Number of records deactivated.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn deactivate_all(
        &self,
        account_id: AccountId,
    ) -> impl std::future::Future<Output = Result<u64>> + Send;

    /// Atomically deactivate `old_hash` and insert `successor`.
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: predecessor was active and unexpired; both halves committed
    /// - `Ok(false)`: predecessor unusable; nothing committed
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable; nothing is committed.
    fn rotate(
        &self,
        old_hash: &str,
        successor: &RefreshTokenRecord,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Active, unexpired records of an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn list_active(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<RefreshTokenRecord>>> + Send;

    /// Delete records whose expiry is before `now`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn delete_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64>> + Send;
}
