//! Device repository and login attempt log traits.

use crate::error::Result;
use crate::providers::{Device, LoginAttempt};
use crate::state::{AccountId, DeviceId};
use chrono::{DateTime, Utc};

/// Device storage.
///
/// # Security
///
/// Every read and write is scoped by `account_id`. A device owned by another
/// account behaves exactly like a missing device.
pub trait DeviceRepository: Send + Sync {
    /// Insert a device, or refresh `last_active`, `ip_address` and `name` of
    /// the existing `(account_id, id)` row. Trust flag and creation time are
    /// preserved on update.
    ///
    /// # Returns
    ///
    /// The stored device after the upsert.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn upsert(
        &self,
        device: &Device,
    ) -> impl std::future::Future<Output = Result<Device>> + Send;

    /// Get a device owned by `account_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn get(
        &self,
        account_id: AccountId,
        device_id: &DeviceId,
    ) -> impl std::future::Future<Output = Result<Option<Device>>> + Send;

    /// Devices of an account, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn list(
        &self,
        account_id: AccountId,
    ) -> impl std::future::Future<Output = Result<Vec<Device>>> + Send;

    /// Set the trust flag.
    ///
    /// # Returns
    ///
    /// The updated device, or `None` if not owned by `account_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn set_trusted(
        &self,
        account_id: AccountId,
        device_id: &DeviceId,
        trusted: bool,
    ) -> impl std::future::Future<Output = Result<Option<Device>>> + Send;

    /// Delete a device.
    ///
    /// # Returns
    ///
    /// `true` if a device owned by `account_id` was deleted.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn delete(
        &self,
        account_id: AccountId,
        device_id: &DeviceId,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// Delete devices inactive since before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn delete_inactive_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64>> + Send;
}

/// Append-only login audit log.
pub trait LoginAttemptLog: Send + Sync {
    /// Append an attempt.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn append(
        &self,
        attempt: &LoginAttempt,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Attempts of an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn list(
        &self,
        account_id: AccountId,
        limit: usize,
        offset: usize,
    ) -> impl std::future::Future<Output = Result<Vec<LoginAttempt>>> + Send;

    /// Failed attempts of an account since `since`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn count_failed_since(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64>> + Send;

    /// Retention sweep: delete attempts older than `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn delete_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64>> + Send;
}
