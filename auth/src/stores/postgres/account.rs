//! `PostgreSQL` account repository.
//!
//! Email uniqueness is enforced case-insensitively by a functional index on
//! `LOWER(email)`. Links live in `oauth_links` with a unique
//! `(provider, provider_user_id)` constraint.

use super::map_db_error;
use crate::error::{AuthError, Result};
use crate::providers::{Account, AccountRepository, OAuthLink};
use crate::state::{AccountId, OAuthProvider};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

const ACCOUNT_COLUMNS: &str = "id, email, username, password_hash, full_name, phone, avatar_url, \
     is_verified, is_active, is_superuser, created_at, updated_at, last_login";

const LINK_COLUMNS: &str = "id, provider, provider_user_id, account_id, access_token, \
     refresh_token, expires_at, created_at, updated_at";

/// `PostgreSQL` account repository.
///
/// # Example
///
/// ```no_run
/// use sentinel_auth::stores::postgres::PostgresAccountRepository;
/// use sqlx::PgPool;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = PgPool::connect("postgresql://localhost/auth").await?;
/// let accounts = PostgresAccountRepository::new(pool);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    /// Create a repository over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_account(row: &PgRow) -> Result<Account> {
        let get = |e: sqlx::Error| AuthError::DatabaseError(format!("Malformed account row: {e}"));
        Ok(Account {
            id: AccountId(row.try_get("id").map_err(get)?),
            email: row.try_get("email").map_err(get)?,
            username: row.try_get("username").map_err(get)?,
            password_hash: row.try_get("password_hash").map_err(get)?,
            full_name: row.try_get("full_name").map_err(get)?,
            phone: row.try_get("phone").map_err(get)?,
            avatar_url: row.try_get("avatar_url").map_err(get)?,
            is_verified: row.try_get("is_verified").map_err(get)?,
            is_active: row.try_get("is_active").map_err(get)?,
            is_superuser: row.try_get("is_superuser").map_err(get)?,
            created_at: row.try_get("created_at").map_err(get)?,
            updated_at: row.try_get("updated_at").map_err(get)?,
            last_login: row.try_get("last_login").map_err(get)?,
        })
    }

    fn row_to_link(row: &PgRow) -> Result<OAuthLink> {
        let get = |e: sqlx::Error| AuthError::DatabaseError(format!("Malformed link row: {e}"));
        let provider: String = row.try_get("provider").map_err(get)?;
        Ok(OAuthLink {
            id: row.try_get("id").map_err(get)?,
            provider: provider
                .parse()
                .map_err(|_| AuthError::DatabaseError(format!("Unknown provider: {provider}")))?,
            provider_user_id: row.try_get("provider_user_id").map_err(get)?,
            account_id: AccountId(row.try_get("account_id").map_err(get)?),
            access_token: row.try_get("access_token").map_err(get)?,
            refresh_token: row.try_get("refresh_token").map_err(get)?,
            expires_at: row.try_get("expires_at").map_err(get)?,
            created_at: row.try_get("created_at").map_err(get)?,
            updated_at: row.try_get("updated_at").map_err(get)?,
        })
    }

    async fn fetch_one_by(&self, predicate: &str, value: &str) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {predicate}");
        sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to load account", e))?
            .as_ref()
            .map(Self::row_to_account)
            .transpose()
    }

    async fn insert_account(tx: &mut Transaction<'_, Postgres>, account: &Account) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO accounts (
                id, email, username, password_hash, full_name, phone, avatar_url,
                is_verified, is_active, is_superuser, created_at, updated_at, last_login
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ",
        )
        .bind(account.id.0)
        .bind(&account.email)
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(&account.full_name)
        .bind(&account.phone)
        .bind(&account.avatar_url)
        .bind(account.is_verified)
        .bind(account.is_active)
        .bind(account.is_superuser)
        .bind(account.created_at)
        .bind(account.updated_at)
        .bind(account.last_login)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_db_error("Failed to insert account", e))?;
        Ok(())
    }

    async fn insert_link(tx: &mut Transaction<'_, Postgres>, link: &OAuthLink) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO oauth_links (
                id, provider, provider_user_id, account_id, access_token,
                refresh_token, expires_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(link.id)
        .bind(link.provider.as_str())
        .bind(&link.provider_user_id)
        .bind(link.account_id.0)
        .bind(&link.access_token)
        .bind(&link.refresh_token)
        .bind(link.expires_at)
        .bind(link.created_at)
        .bind(link.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_db_error("Failed to insert link", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| AuthError::DatabaseError(format!("Failed to begin transaction: {e}")))
    }
}

async fn commit(tx: Transaction<'_, Postgres>) -> Result<()> {
    tx.commit()
        .await
        .map_err(|e| AuthError::DatabaseError(format!("Failed to commit: {e}")))
}

impl AccountRepository for PostgresAccountRepository {
    async fn get_by_id(&self, account_id: AccountId) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        sqlx::query(&sql)
            .bind(account_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to load account", e))?
            .as_ref()
            .map(Self::row_to_account)
            .transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.fetch_one_by("LOWER(email) = LOWER($1)", email).await
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<Account>> {
        self.fetch_one_by("username = $1", username).await
    }

    async fn get_by_phone(&self, phone: &str) -> Result<Option<Account>> {
        self.fetch_one_by("phone = $1", phone).await
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Account>> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at, id LIMIT $1 OFFSET $2"
        );
        sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to list accounts", e))?
            .iter()
            .map(Self::row_to_account)
            .collect()
    }

    async fn create(&self, account: &Account) -> Result<Account> {
        let mut tx = self.begin().await?;
        Self::insert_account(&mut tx, account).await?;
        commit(tx).await?;

        tracing::info!(account_id = %account.id, "Account created");
        Ok(account.clone())
    }

    async fn update(&self, account: &Account) -> Result<Account> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET email = $2, username = $3, password_hash = $4, full_name = $5,
                phone = $6, avatar_url = $7, is_verified = $8, is_active = $9,
                is_superuser = $10, updated_at = $11, last_login = $12
            WHERE id = $1
            ",
        )
        .bind(account.id.0)
        .bind(&account.email)
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(&account.full_name)
        .bind(&account.phone)
        .bind(&account.avatar_url)
        .bind(account.is_verified)
        .bind(account.is_active)
        .bind(account.is_superuser)
        .bind(account.updated_at)
        .bind(account.last_login)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to update account", e))?;

        if result.rows_affected() == 0 {
            return Err(AuthError::AccountNotFound);
        }
        Ok(account.clone())
    }

    async fn record_login(&self, account_id: AccountId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE accounts SET last_login = $2 WHERE id = $1")
            .bind(account_id.0)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to record login", e))?;
        Ok(())
    }

    async fn find_link(
        &self,
        provider: OAuthProvider,
        provider_user_id: &str,
    ) -> Result<Option<OAuthLink>> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM oauth_links WHERE provider = $1 AND provider_user_id = $2"
        );
        sqlx::query(&sql)
            .bind(provider.as_str())
            .bind(provider_user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to load link", e))?
            .as_ref()
            .map(Self::row_to_link)
            .transpose()
    }

    async fn list_links(&self, account_id: AccountId) -> Result<Vec<OAuthLink>> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM oauth_links WHERE account_id = $1 ORDER BY created_at"
        );
        let rows = sqlx::query(&sql)
            .bind(account_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_db_error("Failed to list links", e))?;

        rows.iter().map(Self::row_to_link).collect()
    }

    async fn create_link(&self, link: &OAuthLink) -> Result<OAuthLink> {
        let mut tx = self.begin().await?;
        Self::insert_link(&mut tx, link).await?;
        commit(tx).await?;
        Ok(link.clone())
    }

    async fn update_link_tokens(&self, link: &OAuthLink) -> Result<()> {
        sqlx::query(
            r"
            UPDATE oauth_links
            SET access_token = $2, refresh_token = $3, expires_at = $4, updated_at = $5
            WHERE id = $1
            ",
        )
        .bind(link.id)
        .bind(&link.access_token)
        .bind(&link.refresh_token)
        .bind(link.expires_at)
        .bind(link.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("Failed to update link tokens", e))?;
        Ok(())
    }

    async fn create_with_link(&self, account: &Account, link: &OAuthLink) -> Result<Account> {
        let mut tx = self.begin().await?;
        Self::insert_account(&mut tx, account).await?;
        Self::insert_link(&mut tx, link).await?;
        commit(tx).await?;

        tracing::info!(
            account_id = %account.id,
            provider = %link.provider,
            "Account created from external identity"
        );
        Ok(account.clone())
    }
}
