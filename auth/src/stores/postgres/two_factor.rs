//! `PostgreSQL` two-factor credential store.
//!
//! Each transition is one conditional statement. Backup code consumption
//! uses `array_remove` guarded by `= ANY(...)`, so of two concurrent calls
//! with the same digest only one updates a row.

use super::map_db_error;
use crate::error::{AuthError, Result};
use crate::providers::{TwoFactorCredential, TwoFactorStore};
use crate::state::AccountId;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashSet;

/// `PostgreSQL` two-factor credential store.
#[derive(Clone)]
pub struct PostgresTwoFactorStore {
    pool: PgPool,
}

impl PostgresTwoFactorStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_credential(row: &PgRow) -> Result<TwoFactorCredential> {
        let get = |e: sqlx::Error| AuthError::DatabaseError(format!("Malformed 2FA row: {e}"));
        let codes: Vec<String> = row.try_get("backup_codes").map_err(get)?;
        Ok(TwoFactorCredential {
            account_id: AccountId(row.try_get("account_id").map_err(get)?),
            encrypted_secret: row.try_get("encrypted_secret").map_err(get)?,
            backup_codes: codes.into_iter().collect(),
            is_enabled: row.try_get("is_enabled").map_err(get)?,
            enabled_at: row.try_get("enabled_at").map_err(get)?,
            last_used_at: row.try_get("last_used_at").map_err(get)?,
            created_at: row.try_get("created_at").map_err(get)?,
        })
    }
}

impl TwoFactorStore for PostgresTwoFactorStore {
    async fn get(&self, account_id: AccountId) -> Result<Option<TwoFactorCredential>> {
        sqlx::query(
            r"
            SELECT account_id, encrypted_secret, backup_codes, is_enabled,
                   enabled_at, last_used_at, created_at
            FROM two_factor_credentials
            WHERE account_id = $1
            ",
        )
        .bind(account_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to load 2FA credential", e))?
        .as_ref()
        .map(Self::row_to_credential)
        .transpose()
    }

    async fn save_pending(&self, credential: &TwoFactorCredential) -> Result<()> {
        let codes: Vec<String> = credential.backup_codes.iter().cloned().collect();

        // Replaces a pending row; leaves an enabled row untouched.
        let result = sqlx::query(
            r"
            INSERT INTO two_factor_credentials (
                account_id, encrypted_secret, backup_codes, is_enabled, created_at
            )
            VALUES ($1, $2, $3, FALSE, $4)
            ON CONFLICT (account_id) DO UPDATE
            SET encrypted_secret = EXCLUDED.encrypted_secret,
                backup_codes = EXCLUDED.backup_codes,
                created_at = EXCLUDED.created_at,
                enabled_at = NULL,
                last_used_at = NULL
            WHERE NOT two_factor_credentials.is_enabled
            ",
        )
        .bind(credential.account_id.0)
        .bind(&credential.encrypted_secret)
        .bind(&codes)
        .bind(credential.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to save 2FA credential", e))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::AlreadyEnabled);
        }
        Ok(())
    }

    async fn mark_enabled(
        &self,
        account_id: AccountId,
        sealed_secret: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE two_factor_credentials
            SET is_enabled = TRUE, enabled_at = $2
            WHERE account_id = $1 AND NOT is_enabled AND encrypted_secret = $3
            ",
        )
        .bind(account_id.0)
        .bind(at)
        .bind(sealed_secret)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to enable 2FA", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, account_id: AccountId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM two_factor_credentials WHERE account_id = $1")
            .bind(account_id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to delete 2FA credential", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn consume_backup_code(&self, account_id: AccountId, code_digest: &str) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE two_factor_credentials
            SET backup_codes = array_remove(backup_codes, $2)
            WHERE account_id = $1 AND is_enabled AND $2 = ANY(backup_codes)
            ",
        )
        .bind(account_id.0)
        .bind(code_digest)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to consume backup code", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_backup_codes(
        &self,
        account_id: AccountId,
        code_digests: HashSet<String>,
    ) -> Result<bool> {
        let codes: Vec<String> = code_digests.into_iter().collect();
        let result = sqlx::query(
            r"
            UPDATE two_factor_credentials
            SET backup_codes = $2
            WHERE account_id = $1 AND is_enabled
            ",
        )
        .bind(account_id.0)
        .bind(&codes)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to replace backup codes", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch(&self, account_id: AccountId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE two_factor_credentials SET last_used_at = $2 WHERE account_id = $1")
            .bind(account_id.0)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to touch 2FA credential", e))?;
        Ok(())
    }
}
