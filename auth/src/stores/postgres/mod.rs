//! `PostgreSQL` repositories.
//!
//! Tables are created by the bundled migrations (see [`migrate`]). Every
//! repository shares one [`PgPool`]; multi-row invariants (account plus
//! first link, refresh token rotation) run inside a single transaction.

pub mod account;
pub mod device;
pub mod refresh_token;
pub mod two_factor;

pub use account::PostgresAccountRepository;
pub use device::{PostgresDeviceRepository, PostgresLoginAttemptLog};
pub use refresh_token::PostgresRefreshTokenStore;
pub use two_factor::PostgresTwoFactorStore;

use crate::error::AuthError;
use sqlx::PgPool;

/// Apply the bundled schema migrations.
///
/// # Errors
///
/// Returns `DatabaseError` if a migration fails.
pub async fn migrate(pool: &PgPool) -> crate::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AuthError::DatabaseError(format!("Migration failed: {e}")))?;
    tracing::info!("Auth schema migrations applied");
    Ok(())
}

/// Map a driver error, translating unique violations into
/// [`AuthError::DuplicateAccount`].
pub(crate) fn map_db_error(context: &str, error: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some("accounts_email_key") => "email",
                Some("accounts_username_key") => "username",
                Some("accounts_phone_key") => "phone",
                _ => "oauth_link",
            };
            return AuthError::duplicate(field);
        }
    }
    AuthError::DatabaseError(format!("{context}: {error}"))
}

/// Convert a count or limit for binding as `BIGINT`.
pub(crate) fn as_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

