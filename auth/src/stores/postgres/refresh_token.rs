//! `PostgreSQL` refresh token store.
//!
//! Rotation locks the predecessor row with `SELECT ... FOR UPDATE`, so two
//! concurrent rotations of the same token serialize and only the first sees
//! an active predecessor.

use super::map_db_error;
use crate::error::{AuthError, Result};
use crate::providers::{RefreshTokenRecord, RefreshTokenStore};
use crate::state::AccountId;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const COLUMNS: &str =
    "id, token_hash, account_id, device_info, ip_address, is_active, created_at, expires_at, \
     last_used_at";

/// `PostgreSQL` refresh token store.
#[derive(Clone)]
pub struct PostgresRefreshTokenStore {
    pool: PgPool,
}

impl PostgresRefreshTokenStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> Result<RefreshTokenRecord> {
        let get =
            |e: sqlx::Error| AuthError::DatabaseError(format!("Malformed refresh token row: {e}"));
        Ok(RefreshTokenRecord {
            id: row.try_get("id").map_err(get)?,
            token_hash: row.try_get("token_hash").map_err(get)?,
            account_id: AccountId(row.try_get("account_id").map_err(get)?),
            device_info: row.try_get("device_info").map_err(get)?,
            ip_address: row.try_get("ip_address").map_err(get)?,
            is_active: row.try_get("is_active").map_err(get)?,
            created_at: row.try_get("created_at").map_err(get)?,
            expires_at: row.try_get("expires_at").map_err(get)?,
            last_used_at: row.try_get("last_used_at").map_err(get)?,
        })
    }
}

fn insert_query(
    record: &RefreshTokenRecord,
) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(
        r"
        INSERT INTO refresh_tokens (
            id, token_hash, account_id, device_info, ip_address,
            is_active, created_at, expires_at, last_used_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ",
    )
    .bind(record.id)
    .bind(&record.token_hash)
    .bind(record.account_id.0)
    .bind(&record.device_info)
    .bind(&record.ip_address)
    .bind(record.is_active)
    .bind(record.created_at)
    .bind(record.expires_at)
    .bind(record.last_used_at)
}

impl RefreshTokenStore for PostgresRefreshTokenStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<()> {
        insert_query(record)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to insert refresh token", e))?;
        Ok(())
    }

    async fn find(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM refresh_tokens WHERE token_hash = $1");
        sqlx::query(&sql)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to load refresh token", e))?
            .as_ref()
            .map(Self::row_to_record)
            .transpose()
    }

    async fn touch(&self, token_hash: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE refresh_tokens SET last_used_at = $2 WHERE token_hash = $1")
            .bind(token_hash)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to touch refresh token", e))?;
        Ok(())
    }

    async fn deactivate(&self, token_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_active = FALSE WHERE token_hash = $1 AND is_active",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to revoke refresh token", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_all(&self, account_id: AccountId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_active = FALSE WHERE account_id = $1 AND is_active",
        )
        .bind(account_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to revoke refresh tokens", e))?;
        Ok(result.rows_affected())
    }

    async fn rotate(&self, old_hash: &str, successor: &RefreshTokenRecord) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AuthError::DatabaseError(format!("Failed to begin transaction: {e}")))?;

        let usable: Option<bool> = sqlx::query(
            r"
            SELECT is_active AND expires_at > NOW() AS usable
            FROM refresh_tokens
            WHERE token_hash = $1
            FOR UPDATE
            ",
        )
        .bind(old_hash)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_db_error("Failed to lock refresh token", e))?
        .map(|row| row.try_get("usable"))
        .transpose()
        .map_err(|e| AuthError::DatabaseError(format!("Malformed refresh token row: {e}")))?;

        if usable != Some(true) {
            // Dropping the transaction rolls it back.
            return Ok(false);
        }

        sqlx::query("UPDATE refresh_tokens SET is_active = FALSE WHERE token_hash = $1")
            .bind(old_hash)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error("Failed to deactivate refresh token", e))?;

        insert_query(successor)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_db_error("Failed to insert refresh token", e))?;

        tx.commit()
            .await
            .map_err(|e| AuthError::DatabaseError(format!("Failed to commit rotation: {e}")))?;
        Ok(true)
    }

    async fn list_active(
        &self,
        account_id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM refresh_tokens \
             WHERE account_id = $1 AND is_active AND expires_at > $2 \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(account_id.0)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to list refresh tokens", e))?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to delete expired refresh tokens", e))?;
        Ok(result.rows_affected())
    }
}
