//! Mock device repository and login attempt log for testing.

use super::lock;
use crate::error::Result;
use crate::providers::{Device, DeviceRepository, LoginAttempt, LoginAttemptLog, LoginStatus};
use crate::state::{AccountId, DeviceId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Mock device repository.
///
/// Devices are keyed by `(account_id, device_id)`, so the same fingerprint
/// under two accounts yields two independent rows.
#[derive(Debug, Clone, Default)]
pub struct MockDeviceRepository {
    devices: Arc<Mutex<HashMap<(AccountId, DeviceId), Device>>>,
}

impl MockDeviceRepository {
    /// Create a new mock device repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceRepository for MockDeviceRepository {
    fn upsert(&self, device: &Device) -> impl Future<Output = Result<Device>> + Send {
        let devices = Arc::clone(&self.devices);
        let device = device.clone();

        async move {
            let mut devices = lock(&devices)?;
            let key = (device.account_id, device.id.clone());

            let stored = devices
                .entry(key)
                .and_modify(|existing| {
                    existing.last_active = device.last_active;
                    existing.ip_address.clone_from(&device.ip_address);
                    existing.name.clone_from(&device.name);
                })
                .or_insert(device);

            Ok(stored.clone())
        }
    }

    fn get(
        &self,
        account_id: AccountId,
        device_id: &DeviceId,
    ) -> impl Future<Output = Result<Option<Device>>> + Send {
        let devices = Arc::clone(&self.devices);
        let key = (account_id, device_id.clone());

        async move { Ok(lock(&devices)?.get(&key).cloned()) }
    }

    fn list(&self, account_id: AccountId) -> impl Future<Output = Result<Vec<Device>>> + Send {
        let devices = Arc::clone(&self.devices);

        async move {
            let mut owned: Vec<Device> = lock(&devices)?
                .values()
                .filter(|d| d.account_id == account_id)
                .cloned()
                .collect();
            owned.sort_by(|a, b| b.last_active.cmp(&a.last_active));
            Ok(owned)
        }
    }

    fn set_trusted(
        &self,
        account_id: AccountId,
        device_id: &DeviceId,
        trusted: bool,
    ) -> impl Future<Output = Result<Option<Device>>> + Send {
        let devices = Arc::clone(&self.devices);
        let key = (account_id, device_id.clone());

        async move {
            Ok(lock(&devices)?.get_mut(&key).map(|device| {
                device.is_trusted = trusted;
                device.clone()
            }))
        }
    }

    fn delete(
        &self,
        account_id: AccountId,
        device_id: &DeviceId,
    ) -> impl Future<Output = Result<bool>> + Send {
        let devices = Arc::clone(&self.devices);
        let key = (account_id, device_id.clone());

        async move { Ok(lock(&devices)?.remove(&key).is_some()) }
    }

    fn delete_inactive_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64>> + Send {
        let devices = Arc::clone(&self.devices);

        async move {
            let mut devices = lock(&devices)?;
            let before = devices.len();
            devices.retain(|_, d| d.last_active >= cutoff);
            Ok((before - devices.len()) as u64)
        }
    }
}

/// Mock login attempt log.
///
/// Attempts are kept in append order, so reverse iteration is newest first.
#[derive(Debug, Clone, Default)]
pub struct MockLoginAttemptLog {
    attempts: Arc<Mutex<Vec<LoginAttempt>>>,
}

impl MockLoginAttemptLog {
    /// Create a new mock log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoginAttemptLog for MockLoginAttemptLog {
    fn append(&self, attempt: &LoginAttempt) -> impl Future<Output = Result<()>> + Send {
        let attempts = Arc::clone(&self.attempts);
        let attempt = attempt.clone();

        async move {
            lock(&attempts)?.push(attempt);
            Ok(())
        }
    }

    fn list(
        &self,
        account_id: AccountId,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Vec<LoginAttempt>>> + Send {
        let attempts = Arc::clone(&self.attempts);

        async move {
            Ok(lock(&attempts)?
                .iter()
                .rev()
                .filter(|a| a.account_id == account_id)
                .skip(offset)
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn count_failed_since(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64>> + Send {
        let attempts = Arc::clone(&self.attempts);

        async move {
            Ok(lock(&attempts)?
                .iter()
                .filter(|a| {
                    a.account_id == account_id
                        && a.status == LoginStatus::Failed
                        && a.created_at >= since
                })
                .count() as u64)
        }
    }

    fn delete_before(&self, cutoff: DateTime<Utc>) -> impl Future<Output = Result<u64>> + Send {
        let attempts = Arc::clone(&self.attempts);

        async move {
            let mut attempts = lock(&attempts)?;
            let before = attempts.len();
            attempts.retain(|a| a.created_at >= cutoff);
            Ok((before - attempts.len()) as u64)
        }
    }
}
