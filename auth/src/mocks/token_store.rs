//! Mock token store for testing.

use super::lock;
use crate::error::Result;
use crate::providers::{TokenData, TokenStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock token store.
///
/// In-memory token store with atomic single-use semantics.
#[derive(Debug, Clone, Default)]
pub struct MockTokenStore {
    tokens: Arc<Mutex<HashMap<String, TokenData>>>,
}

impl MockTokenStore {
    /// Create a new mock token store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens, expired ones included (for testing).
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.tokens)?.len())
    }

    /// Whether the store is empty (for testing).
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl TokenStore for MockTokenStore {
    async fn store_token(&self, token_id: &str, token_data: TokenData) -> Result<()> {
        lock(&self.tokens)?.insert(token_id.to_string(), token_data);
        Ok(())
    }

    async fn consume_token(&self, token_id: &str, token: &str) -> Result<Option<TokenData>> {
        let mut tokens = lock(&self.tokens)?;

        let Some(stored) = tokens.get(token_id) else {
            return Ok(None);
        };

        // Both checks always run so a wrong token and an expired token take
        // the same path.
        let token_matches =
            constant_time_eq::constant_time_eq(token.as_bytes(), stored.token.as_bytes());
        let is_expired = stored.is_expired(Utc::now());

        if is_expired {
            tokens.remove(token_id);
            return Ok(None);
        }

        if token_matches {
            Ok(tokens.remove(token_id))
        } else {
            Ok(None)
        }
    }

    async fn peek_token(&self, token_id: &str) -> Result<Option<TokenData>> {
        Ok(lock(&self.tokens)?
            .get(token_id)
            .filter(|t| !t.is_expired(Utc::now()))
            .cloned())
    }

    async fn delete_token(&self, token_id: &str) -> Result<()> {
        lock(&self.tokens)?.remove(token_id);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tokens = lock(&self.tokens)?;
        let before = tokens.len();
        tokens.retain(|_, t| !t.is_expired(now));
        Ok((before - tokens.len()) as u64)
    }
}
