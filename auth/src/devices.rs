//! Device registry and login audit trail.
//!
//! Devices are identified by a deterministic fingerprint of the parsed user
//! agent. The source IP is not part of the fingerprint; a device keeps its
//! id across networks.

use crate::config::DeviceConfig;
use crate::constants::{DEFAULT_HISTORY_LIMIT, MAX_ATTEMPT_USER_AGENT_LEN, MAX_HISTORY_LIMIT};
use crate::crypto::sha256_hex;
use crate::error::{AuthError, Result};
use crate::providers::{Device, DeviceRepository, LoginAttempt, LoginAttemptLog, LoginStatus};
use crate::state::{AccountId, DeviceId, RequestContext};
use crate::utils::{parse_user_agent, truncate_chars};
use chrono::Utc;
use tracing::{debug, info, warn};

/// Derive the device id of a user agent.
///
/// SHA-256 of `"{browser}:{browser_version}:{os}:{os_version}"`, first 32 hex
/// characters.
///
/// # Examples
///
/// ```
/// use sentinel_auth::devices::fingerprint;
///
/// let ua = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
/// assert_eq!(fingerprint(ua), fingerprint(ua));
/// assert_eq!(fingerprint(ua).as_str().len(), 32);
/// ```
#[must_use]
pub fn fingerprint(user_agent: &str) -> DeviceId {
    let parsed = parse_user_agent(user_agent);
    let material = format!(
        "{}:{}:{}:{}",
        parsed.browser, parsed.browser_version, parsed.os, parsed.os_version
    );
    let mut digest = sha256_hex(&material);
    digest.truncate(32);
    DeviceId(digest)
}

/// Input for one audit row.
#[derive(Debug, Clone, Copy)]
pub struct AttemptRecord<'a> {
    /// Account the attempt targeted.
    pub account_id: AccountId,
    /// Device, when resolved.
    pub device_id: Option<&'a DeviceId>,
    /// Caller facts.
    pub context: &'a RequestContext,
    /// Login method, see [`crate::constants::login_methods`].
    pub method: &'a str,
    /// Outcome.
    pub status: LoginStatus,
    /// Reason, see [`crate::constants::failure_reasons`].
    pub failure_reason: Option<&'a str>,
}

/// Device registry and login attempt log.
#[derive(Clone)]
pub struct DeviceRegistry<D, L> {
    devices: D,
    attempts: L,
    config: DeviceConfig,
}

impl<D, L> DeviceRegistry<D, L>
where
    D: DeviceRepository,
    L: LoginAttemptLog,
{
    /// Create a registry.
    #[must_use]
    pub const fn new(devices: D, attempts: L, config: DeviceConfig) -> Self {
        Self {
            devices,
            attempts,
            config,
        }
    }

    /// Register the caller's device, or refresh its activity if known.
    ///
    /// # Errors
    ///
    /// Returns error if the device store is unavailable.
    pub async fn register_or_touch(
        &self,
        account_id: AccountId,
        context: &RequestContext,
    ) -> Result<Device> {
        let parsed = parse_user_agent(&context.user_agent);
        let now = Utc::now();

        let device = Device {
            id: fingerprint(&context.user_agent),
            account_id,
            name: parsed.device_name(),
            device_type: parsed.device_type,
            browser: parsed.browser,
            browser_version: parsed.browser_version,
            os: parsed.os,
            os_version: parsed.os_version,
            ip_address: Some(context.ip_address.to_string()),
            is_trusted: false,
            last_active: now,
            created_at: now,
        };

        let stored = self.devices.upsert(&device).await?;
        debug!(account_id = %account_id, device_id = %stored.id, "Device touched");
        Ok(stored)
    }

    /// Devices of an account, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns error if the device store is unavailable.
    pub async fn list(&self, account_id: AccountId) -> Result<Vec<Device>> {
        self.devices.list(account_id).await
    }

    /// Set or clear the trust flag of a device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if the device does not belong to the account.
    pub async fn trust(
        &self,
        account_id: AccountId,
        device_id: &DeviceId,
        trusted: bool,
    ) -> Result<Device> {
        let device = self
            .devices
            .set_trusted(account_id, device_id, trusted)
            .await?
            .ok_or(AuthError::DeviceNotFound)?;

        info!(account_id = %account_id, device_id = %device_id, trusted, "Device trust updated");
        Ok(device)
    }

    /// Forget a device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if the device does not belong to the account.
    pub async fn remove(&self, account_id: AccountId, device_id: &DeviceId) -> Result<()> {
        if !self.devices.delete(account_id, device_id).await? {
            return Err(AuthError::DeviceNotFound);
        }

        info!(account_id = %account_id, device_id = %device_id, "Device removed");
        Ok(())
    }

    /// Append an audit row. Failures are logged and swallowed.
    pub async fn record_attempt(&self, record: AttemptRecord<'_>) {
        let attempt = LoginAttempt {
            id: uuid::Uuid::new_v4(),
            account_id: record.account_id,
            device_id: record.device_id.cloned(),
            ip_address: record.context.ip_address.to_string(),
            user_agent: truncate_chars(&record.context.user_agent, MAX_ATTEMPT_USER_AGENT_LEN),
            login_method: record.method.to_string(),
            status: record.status,
            failure_reason: record.failure_reason.map(ToString::to_string),
            created_at: Utc::now(),
        };

        if let Err(e) = self.attempts.append(&attempt).await {
            warn!(
                account_id = %record.account_id,
                status = %record.status,
                error = %e,
                "Failed to record login attempt"
            );
        }
    }

    /// Login history, newest first.
    ///
    /// `limit` defaults to 50 and is clamped to `1..=100`.
    ///
    /// # Errors
    ///
    /// Returns error if the log is unavailable.
    pub async fn login_history(
        &self,
        account_id: AccountId,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<LoginAttempt>> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.attempts.list(account_id, limit, offset).await
    }

    /// Failed attempts within the configured recent-failure window.
    ///
    /// # Errors
    ///
    /// Returns error if the log is unavailable.
    pub async fn recent_failed_attempts(&self, account_id: AccountId) -> Result<u64> {
        let since = Utc::now() - self.config.recent_failure_window;
        self.attempts.count_failed_since(account_id, since).await
    }

    /// Delete devices idle past the retention period.
    ///
    /// # Errors
    ///
    /// Returns error if the device store is unavailable.
    pub async fn sweep_inactive(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.config.inactive_retention;
        let removed = self.devices.delete_inactive_before(cutoff).await?;
        if removed > 0 {
            info!(removed, "Swept inactive devices");
        }
        Ok(removed)
    }

    /// Delete login attempts past the retention period.
    ///
    /// # Errors
    ///
    /// Returns error if the log is unavailable.
    pub async fn sweep_attempts(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.config.attempt_retention;
        let removed = self.attempts.delete_before(cutoff).await?;
        if removed > 0 {
            info!(removed, "Swept login attempts");
        }
        Ok(removed)
    }
}
