//! Two-factor credential store trait.

use crate::error::Result;
use crate::providers::TwoFactorCredential;
use crate::state::AccountId;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Storage for per-account two-factor credentials.
///
/// Every state transition is a single conditional operation so that concurrent
/// calls for the same account cannot interleave a read-modify-write.
pub trait TwoFactorStore: Send + Sync {
    /// Fetch the credential of an account.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn get(
        &self,
        account_id: AccountId,
    ) -> impl std::future::Future<Output = Result<Option<TwoFactorCredential>>> + Send;

    /// Store a pending credential, replacing any earlier pending one.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyEnabled` if an enabled credential exists (unchanged).
    fn save_pending(
        &self,
        credential: &TwoFactorCredential,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Transition pending → enabled, but only while the pending credential
    /// still holds `sealed_secret`. A setup that replaced the secret after it
    /// was checked leaves the new pending credential untouched.
    ///
    /// # Returns
    ///
    /// `true` if a pending credential was enabled by this call.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn mark_enabled(
        &self,
        account_id: AccountId,
        sealed_secret: &str,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Delete the credential.
    ///
    /// # Returns
    ///
    /// `true` if a credential was deleted.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn delete(
        &self,
        account_id: AccountId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Remove `code_digest` from an enabled credential's backup set.
    ///
    /// Atomic consume-if-present: of several concurrent calls with the same
    /// digest at most one returns `true`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn consume_backup_code(
        &self,
        account_id: AccountId,
        code_digest: &str,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Replace the backup set of an enabled credential.
    ///
    /// # Returns
    ///
    /// `true` if an enabled credential was updated.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn replace_backup_codes(
        &self,
        account_id: AccountId,
        code_digests: HashSet<String>,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Stamp `last_used_at`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn touch(
        &self,
        account_id: AccountId,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
