//! `PostgreSQL` device repository and login audit log.
//!
//! Every device query filters on both `account_id` and `id`; a device owned
//! by another account is indistinguishable from a missing one.
//!
//! # Example
//!
//! ```no_run
//! use sentinel_auth::stores::postgres::{PostgresDeviceRepository, PostgresLoginAttemptLog};
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgresql://localhost/auth").await?;
//! let devices = PostgresDeviceRepository::new(pool.clone());
//! let attempts = PostgresLoginAttemptLog::new(pool);
//! # Ok(())
//! # }
//! ```

use super::{as_i64, map_db_error};
use crate::error::{AuthError, Result};
use crate::providers::{Device, DeviceRepository, LoginAttempt, LoginAttemptLog};
use crate::state::{AccountId, DeviceId};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const DEVICE_COLUMNS: &str = "id, account_id, name, device_type, browser, browser_version, os, \
     os_version, ip_address, is_trusted, last_active, created_at";

/// `PostgreSQL` device repository.
#[derive(Clone)]
pub struct PostgresDeviceRepository {
    pool: PgPool,
}

impl PostgresDeviceRepository {
    /// Create a repository over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_device(row: &PgRow) -> Result<Device> {
        let get = |e: sqlx::Error| AuthError::DatabaseError(format!("Malformed device row: {e}"));
        let device_type: String = row.try_get("device_type").map_err(get)?;
        Ok(Device {
            id: DeviceId(row.try_get("id").map_err(get)?),
            account_id: AccountId(row.try_get("account_id").map_err(get)?),
            name: row.try_get("name").map_err(get)?,
            device_type: device_type.parse()?,
            browser: row.try_get("browser").map_err(get)?,
            browser_version: row.try_get("browser_version").map_err(get)?,
            os: row.try_get("os").map_err(get)?,
            os_version: row.try_get("os_version").map_err(get)?,
            ip_address: row.try_get("ip_address").map_err(get)?,
            is_trusted: row.try_get("is_trusted").map_err(get)?,
            last_active: row.try_get("last_active").map_err(get)?,
            created_at: row.try_get("created_at").map_err(get)?,
        })
    }
}

impl DeviceRepository for PostgresDeviceRepository {
    async fn upsert(&self, device: &Device) -> Result<Device> {
        let sql = format!(
            r"
            INSERT INTO devices (
                id, account_id, name, device_type, browser, browser_version,
                os, os_version, ip_address, is_trusted, last_active, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (account_id, id) DO UPDATE
            SET last_active = EXCLUDED.last_active,
                ip_address = EXCLUDED.ip_address,
                name = EXCLUDED.name
            RETURNING {DEVICE_COLUMNS}
            "
        );
        let row = sqlx::query(&sql)
            .bind(device.id.as_str())
            .bind(device.account_id.0)
            .bind(&device.name)
            .bind(device.device_type.as_str())
            .bind(&device.browser)
            .bind(&device.browser_version)
            .bind(&device.os)
            .bind(&device.os_version)
            .bind(&device.ip_address)
            .bind(device.is_trusted)
            .bind(device.last_active)
            .bind(device.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to upsert device", e))?;

        Self::row_to_device(&row)
    }

    async fn get(&self, account_id: AccountId, device_id: &DeviceId) -> Result<Option<Device>> {
        let sql = format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE account_id = $1 AND id = $2");
        sqlx::query(&sql)
            .bind(account_id.0)
            .bind(device_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to load device", e))?
            .as_ref()
            .map(Self::row_to_device)
            .transpose()
    }

    async fn list(&self, account_id: AccountId) -> Result<Vec<Device>> {
        let sql = format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE account_id = $1 ORDER BY last_active DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(account_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to list devices", e))?;

        rows.iter().map(Self::row_to_device).collect()
    }

    async fn set_trusted(
        &self,
        account_id: AccountId,
        device_id: &DeviceId,
        trusted: bool,
    ) -> Result<Option<Device>> {
        let sql = format!(
            "UPDATE devices SET is_trusted = $3 WHERE account_id = $1 AND id = $2 \
             RETURNING {DEVICE_COLUMNS}"
        );
        sqlx::query(&sql)
            .bind(account_id.0)
            .bind(device_id.as_str())
            .bind(trusted)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to update device trust", e))?
            .as_ref()
            .map(Self::row_to_device)
            .transpose()
    }

    async fn delete(&self, account_id: AccountId, device_id: &DeviceId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE account_id = $1 AND id = $2")
            .bind(account_id.0)
            .bind(device_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to delete device", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_inactive_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM devices WHERE last_active < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to sweep devices", e))?;
        Ok(result.rows_affected())
    }
}

/// `PostgreSQL` login attempt log.
#[derive(Clone)]
pub struct PostgresLoginAttemptLog {
    pool: PgPool,
}

impl PostgresLoginAttemptLog {
    /// Create a log over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_attempt(row: &PgRow) -> Result<LoginAttempt> {
        let get = |e: sqlx::Error| AuthError::DatabaseError(format!("Malformed attempt row: {e}"));
        let status: String = row.try_get("status").map_err(get)?;
        let device_id: Option<String> = row.try_get("device_id").map_err(get)?;
        Ok(LoginAttempt {
            id: row.try_get("id").map_err(get)?,
            account_id: AccountId(row.try_get("account_id").map_err(get)?),
            device_id: device_id.map(DeviceId),
            ip_address: row.try_get("ip_address").map_err(get)?,
            user_agent: row.try_get("user_agent").map_err(get)?,
            login_method: row.try_get("login_method").map_err(get)?,
            status: status.parse()?,
            failure_reason: row.try_get("failure_reason").map_err(get)?,
            created_at: row.try_get("created_at").map_err(get)?,
        })
    }
}

impl LoginAttemptLog for PostgresLoginAttemptLog {
    async fn append(&self, attempt: &LoginAttempt) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO login_attempts (
                id, account_id, device_id, ip_address, user_agent,
                login_method, status, failure_reason, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(attempt.id)
        .bind(attempt.account_id.0)
        .bind(attempt.device_id.as_ref().map(DeviceId::as_str))
        .bind(&attempt.ip_address)
        .bind(&attempt.user_agent)
        .bind(&attempt.login_method)
        .bind(attempt.status.as_str())
        .bind(&attempt.failure_reason)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to record login attempt", e))?;
        Ok(())
    }

    async fn list(
        &self,
        account_id: AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LoginAttempt>> {
        let rows = sqlx::query(
            r"
            SELECT id, account_id, device_id, ip_address, user_agent,
                   login_method, status, failure_reason, created_at
            FROM login_attempts
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(account_id.0)
        .bind(as_i64(limit))
        .bind(as_i64(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to list login attempts", e))?;

        rows.iter().map(Self::row_to_attempt).collect()
    }

    async fn count_failed_since(&self, account_id: AccountId, since: DateTime<Utc>) -> Result<u64> {
        let count: i64 = sqlx::query(
            r"
            SELECT COUNT(*) AS failed
            FROM login_attempts
            WHERE account_id = $1 AND status = 'failed' AND created_at >= $2
            ",
        )
        .bind(account_id.0)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to count login attempts", e))?
        .try_get("failed")
        .map_err(|e| AuthError::DatabaseError(format!("Malformed count row: {e}")))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM login_attempts WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to sweep login attempts", e))?;
        Ok(result.rows_affected())
    }
}
