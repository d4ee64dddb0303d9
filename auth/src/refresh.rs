//! Refresh token registry.
//!
//! Refresh tokens are persisted by SHA-256 digest only. Each use rotates the
//! token: the predecessor is deactivated and the successor inserted in one
//! store operation, so a replayed token finds nothing to rotate.

use crate::constants::MAX_DEVICE_INFO_LEN;
use crate::crypto::sha256_hex;
use crate::error::{AuthError, Result};
use crate::providers::{Account, AccountRepository, RefreshTokenRecord, RefreshTokenStore};
use crate::state::{AccountId, RequestContext};
use crate::utils::truncate_chars;
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

/// Issued refresh tokens and their lifecycle.
#[derive(Clone)]
pub struct RefreshTokenRegistry<R, A> {
    store: R,
    accounts: A,
    ttl: Duration,
}

impl<R, A> RefreshTokenRegistry<R, A>
where
    R: RefreshTokenStore,
    A: AccountRepository,
{
    /// Create a registry issuing records valid for `ttl`.
    #[must_use]
    pub const fn new(store: R, accounts: A, ttl: Duration) -> Self {
        Self { store, accounts, ttl }
    }

    fn record_for(
        &self,
        account_id: AccountId,
        token: &str,
        context: &RequestContext,
    ) -> RefreshTokenRecord {
        let now = Utc::now();
        RefreshTokenRecord {
            id: uuid::Uuid::new_v4(),
            token_hash: sha256_hex(token),
            account_id,
            device_info: Some(truncate_chars(&context.user_agent, MAX_DEVICE_INFO_LEN)),
            ip_address: Some(context.ip_address.to_string()),
            is_active: true,
            created_at: now,
            expires_at: now + self.ttl,
            last_used_at: None,
        }
    }

    /// Persist a freshly issued refresh token.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    pub async fn create(
        &self,
        account_id: AccountId,
        token: &str,
        context: &RequestContext,
    ) -> Result<RefreshTokenRecord> {
        let record = self.record_for(account_id, token, context);
        self.store.insert(&record).await?;

        debug!(account_id = %account_id, record_id = %record.id, "Refresh token stored");
        Ok(record)
    }

    /// Resolve a refresh token to its account.
    ///
    /// Unknown, revoked and expired tokens, and tokens of deactivated
    /// accounts, all resolve to `None`.
    ///
    /// # Errors
    ///
    /// Returns error if a store is unavailable.
    pub async fn validate_and_fetch_account(&self, token: &str) -> Result<Option<Account>> {
        let hash = sha256_hex(token);
        let now = Utc::now();

        let Some(record) = self.store.find(&hash).await?.filter(|r| r.is_usable(now)) else {
            return Ok(None);
        };

        let account = self
            .accounts
            .get_by_id(record.account_id)
            .await?
            .filter(|a| a.is_active);

        if account.is_some() {
            self.store.touch(&hash, now).await?;
        }
        Ok(account)
    }

    /// Revoke one token.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let revoked = self.store.deactivate(&sha256_hex(token)).await?;
        if revoked {
            info!("Refresh token revoked");
        }
        Ok(revoked)
    }

    /// Revoke every token of an account.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    pub async fn revoke_all(&self, account_id: AccountId) -> Result<u64> {
        let count = self.store.deactivate_all(account_id).await?;
        info!(account_id = %account_id, count, "All refresh tokens revoked");
        Ok(count)
    }

    /// Exchange `old_token` for `new_token` atomically.
    ///
    /// # Errors
    ///
    /// Returns `TokenRevoked` if `old_token` is unknown, already rotated,
    /// revoked or expired; nothing is stored in that case.
    pub async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        context: &RequestContext,
    ) -> Result<RefreshTokenRecord> {
        let old_hash = sha256_hex(old_token);
        let predecessor = self.store.find(&old_hash).await?.ok_or(AuthError::TokenRevoked)?;

        let successor = self.record_for(predecessor.account_id, new_token, context);
        if !self.store.rotate(&old_hash, &successor).await? {
            warn!(
                account_id = %predecessor.account_id,
                record_id = %predecessor.id,
                "Refresh token replay rejected"
            );
            return Err(AuthError::TokenRevoked);
        }

        debug!(
            account_id = %successor.account_id,
            record_id = %successor.id,
            "Refresh token rotated"
        );
        Ok(successor)
    }

    /// Active sessions of an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    pub async fn list_active(&self, account_id: AccountId) -> Result<Vec<RefreshTokenRecord>> {
        self.store.list_active(account_id, Utc::now()).await
    }

    /// Delete expired records.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let removed = self.store.delete_expired(Utc::now()).await?;
        if removed > 0 {
            info!(removed, "Swept expired refresh tokens");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockAccountRepository, MockRefreshTokenStore};
    use std::net::{IpAddr, Ipv4Addr};

    struct Fixture {
        registry: RefreshTokenRegistry<MockRefreshTokenStore, MockAccountRepository>,
        store: MockRefreshTokenStore,
        accounts: MockAccountRepository,
    }

    fn fixture(ttl: Duration) -> Fixture {
        let store = MockRefreshTokenStore::new();
        let accounts = MockAccountRepository::new();
        Fixture {
            registry: RefreshTokenRegistry::new(store.clone(), accounts.clone(), ttl),
            store,
            accounts,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(IpAddr::V4(Ipv4Addr::LOCALHOST), "x".repeat(400))
    }

    async fn account(accounts: &MockAccountRepository) -> Account {
        accounts
            .create(&Account::new("a@example.com".into(), "alice".into(), "hash".into()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_stores_digest_only() {
        let f = fixture(Duration::days(7));
        let account = account(&f.accounts).await;

        let record = f.registry.create(account.id, "token-value", &ctx()).await.unwrap();

        assert_eq!(record.token_hash, sha256_hex("token-value"));
        assert_eq!(
            record.device_info.as_ref().map(|d| d.chars().count()),
            Some(MAX_DEVICE_INFO_LEN)
        );
        assert!(f.store.all_records().unwrap().iter().all(|r| r.token_hash != "token-value"));
    }

    #[tokio::test]
    async fn test_validate_hides_unusable_tokens() {
        let f = fixture(Duration::days(7));
        let mut account = account(&f.accounts).await;
        f.registry.create(account.id, "t1", &ctx()).await.unwrap();

        assert_eq!(
            f.registry.validate_and_fetch_account("t1").await.unwrap().map(|a| a.id),
            Some(account.id)
        );
        assert!(f.registry.validate_and_fetch_account("unknown").await.unwrap().is_none());

        account.is_active = false;
        f.accounts.update(&account).await.unwrap();
        assert!(f.registry.validate_and_fetch_account("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_token_is_invisible_and_swept() {
        let f = fixture(Duration::seconds(-1));
        let account = account(&f.accounts).await;
        f.registry.create(account.id, "old", &ctx()).await.unwrap();

        assert!(f.registry.validate_and_fetch_account("old").await.unwrap().is_none());
        assert_eq!(f.registry.sweep_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rotation_replay_is_rejected() {
        let f = fixture(Duration::days(7));
        let account = account(&f.accounts).await;
        f.registry.create(account.id, "r1", &ctx()).await.unwrap();

        f.registry.rotate("r1", "r2", &ctx()).await.unwrap();
        assert_eq!(
            f.registry.rotate("r1", "r3", &ctx()).await.map(|_| ()),
            Err(AuthError::TokenRevoked)
        );

        let active = f.registry.list_active(account.id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].token_hash, sha256_hex("r2"));
        assert!(f.store.find(&sha256_hex("r3")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_rotation_has_one_winner() {
        let f = fixture(Duration::days(7));
        let account = account(&f.accounts).await;
        f.registry.create(account.id, "r1", &ctx()).await.unwrap();

        let context = ctx();
        let (a, b) = tokio::join!(
            f.registry.rotate("r1", "a", &context),
            f.registry.rotate("r1", "b", &context),
        );

        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(f.registry.list_active(account.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_all() {
        let f = fixture(Duration::days(7));
        let account = account(&f.accounts).await;
        for token in ["a", "b", "c"] {
            f.registry.create(account.id, token, &ctx()).await.unwrap();
        }

        assert!(f.registry.revoke("a").await.unwrap());
        assert!(!f.registry.revoke("a").await.unwrap());
        assert_eq!(f.registry.revoke_all(account.id).await.unwrap(), 2);
        assert!(f.registry.list_active(account.id).await.unwrap().is_empty());
    }
}
