//! Redis-based one-time token store.
//!
//! # Layout
//!
//! - **Key**: `auth:token:{token_id}` → JSON-serialized [`TokenData`]
//! - **TTL**: derived from `expires_at`, at least one second
//! - **Consumption**: `GETDEL`, so concurrent consumers see the value at
//!   most once
//!
//! A mismatching token still deletes the entry. Token ids embed the token
//! digest, so a mismatch only happens for forged input.

use crate::error::{AuthError, Result};
use crate::providers::{TokenData, TokenStore};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// `Redis`-based token store with atomic consumption.
///
/// # Example
///
/// ```no_run
/// use sentinel_auth::stores::RedisTokenStore;
///
/// # async fn example() -> sentinel_auth::Result<()> {
/// let store = RedisTokenStore::new("redis://127.0.0.1:6379").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisTokenStore {
    conn_manager: ConnectionManager,
}

impl RedisTokenStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the URL is malformed or the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| AuthError::InternalError(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            AuthError::InternalError(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("RedisTokenStore initialized");
        Ok(Self { conn_manager })
    }

    fn token_key(token_id: &str) -> String {
        format!("auth:token:{token_id}")
    }

    fn decode(bytes: &[u8]) -> Result<TokenData> {
        serde_json::from_slice(bytes)
            .map_err(|e| AuthError::InternalError(format!("Corrupt token record: {e}")))
    }
}

impl TokenStore for RedisTokenStore {
    async fn store_token(&self, token_id: &str, token_data: TokenData) -> Result<()> {
        let mut conn = self.conn_manager.clone();

        let bytes = serde_json::to_vec(&token_data)
            .map_err(|e| AuthError::InternalError(format!("Failed to encode token: {e}")))?;

        #[allow(clippy::cast_sign_loss)] // clamped to >= 1
        let ttl_seconds = token_data
            .expires_at
            .signed_duration_since(Utc::now())
            .num_seconds()
            .max(1) as u64;

        let _: () = conn
            .set_ex(Self::token_key(token_id), bytes, ttl_seconds)
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to store token: {e}")))?;

        tracing::debug!(token_type = ?token_data.token_type, ttl_seconds, "Stored one-time token");
        Ok(())
    }

    async fn consume_token(&self, token_id: &str, token: &str) -> Result<Option<TokenData>> {
        let mut conn = self.conn_manager.clone();

        let bytes: Option<Vec<u8>> = conn
            .get_del(Self::token_key(token_id))
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to consume token: {e}")))?;

        let Some(bytes) = bytes else {
            return Ok(None);
        };
        let data = Self::decode(&bytes)?;

        let matches = constant_time_eq::constant_time_eq(token.as_bytes(), data.token.as_bytes());
        if matches && !data.is_expired(Utc::now()) {
            Ok(Some(data))
        } else {
            tracing::warn!(token_type = ?data.token_type, "One-time token rejected on consumption");
            Ok(None)
        }
    }

    async fn peek_token(&self, token_id: &str) -> Result<Option<TokenData>> {
        let mut conn = self.conn_manager.clone();

        let bytes: Option<Vec<u8>> = conn
            .get(Self::token_key(token_id))
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to read token: {e}")))?;

        Ok(bytes
            .map(|b| Self::decode(&b))
            .transpose()?
            .filter(|t| !t.is_expired(Utc::now())))
    }

    async fn delete_token(&self, token_id: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();

        let _: i64 = conn
            .del(Self::token_key(token_id))
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to delete token: {e}")))?;
        Ok(())
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<u64> {
        // Key TTLs already evict expired tokens.
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::TokenType;
    use chrono::Duration;

    fn token(value: &str, ttl: Duration) -> TokenData {
        TokenData::new(
            TokenType::EmailVerification,
            value.to_string(),
            serde_json::json!({"account_id": "a"}),
            Utc::now() + ttl,
        )
    }

    #[tokio::test]
    #[ignore = "requires Redis at localhost:6379"]
    async fn test_redis_token_single_use() {
        let store = RedisTokenStore::new("redis://127.0.0.1:6379").await.unwrap();
        let id = format!("test:{}", uuid::Uuid::new_v4());

        store.store_token(&id, token("secret", Duration::minutes(5))).await.unwrap();
        assert!(store.peek_token(&id).await.unwrap().is_some());

        let (a, b) = tokio::join!(
            store.consume_token(&id, "secret"),
            store.consume_token(&id, "secret")
        );
        let successes = [a.unwrap(), b.unwrap()].iter().filter(|r| r.is_some()).count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    #[ignore = "requires Redis at localhost:6379"]
    async fn test_redis_token_mismatch() {
        let store = RedisTokenStore::new("redis://127.0.0.1:6379").await.unwrap();
        let id = format!("test:{}", uuid::Uuid::new_v4());

        store.store_token(&id, token("secret", Duration::minutes(5))).await.unwrap();
        assert!(store.consume_token(&id, "wrong").await.unwrap().is_none());
    }
}
