//! Mock account repository for testing.

use super::lock;
use crate::error::{AuthError, Result};
use crate::providers::{Account, AccountRepository, OAuthLink};
use crate::state::{AccountId, OAuthProvider};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct AccountState {
    accounts: HashMap<AccountId, Account>,
    links: Vec<OAuthLink>,
}

impl AccountState {
    /// Unique-field check mirroring the database constraints.
    fn conflict(&self, candidate: &Account) -> Option<&'static str> {
        let others = self.accounts.values().filter(|a| a.id != candidate.id);

        for other in others {
            if other.email.eq_ignore_ascii_case(&candidate.email) {
                return Some("email");
            }
            if other.username == candidate.username {
                return Some("username");
            }
            if candidate.phone.is_some() && other.phone == candidate.phone {
                return Some("phone");
            }
        }
        None
    }

    fn link_exists(&self, provider: OAuthProvider, provider_user_id: &str) -> bool {
        self.links
            .iter()
            .any(|l| l.provider == provider && l.provider_user_id == provider_user_id)
    }
}

/// Mock account repository.
///
/// Enforces the same uniqueness rules as the `PostgreSQL` schema: email
/// (case-insensitive), username, phone, and `(provider, provider_user_id)`.
#[derive(Debug, Clone, Default)]
pub struct MockAccountRepository {
    state: Arc<Mutex<AccountState>>,
}

impl MockAccountRepository {
    /// Create a new mock account repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts (for testing).
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the lock is poisoned.
    pub fn count(&self) -> Result<usize> {
        Ok(lock(&self.state)?.accounts.len())
    }
}

impl AccountRepository for MockAccountRepository {
    async fn get_by_id(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(lock(&self.state)?.accounts.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(lock(&self.state)?
            .accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<Account>> {
        Ok(lock(&self.state)?
            .accounts
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn get_by_phone(&self, phone: &str) -> Result<Option<Account>> {
        Ok(lock(&self.state)?
            .accounts
            .values()
            .find(|a| a.phone.as_deref() == Some(phone))
            .cloned())
    }

    async fn list(&self, offset: usize, limit: usize) -> Result<Vec<Account>> {
        let state = lock(&self.state)?;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| (a.created_at, a.id.0));

        Ok(accounts.into_iter().skip(offset).take(limit).collect())
    }

    async fn create(&self, account: &Account) -> Result<Account> {
        let mut state = lock(&self.state)?;

        if let Some(field) = state.conflict(account) {
            return Err(AuthError::duplicate(field));
        }

        state.accounts.insert(account.id, account.clone());
        Ok(account.clone())
    }

    async fn update(&self, account: &Account) -> Result<Account> {
        let mut state = lock(&self.state)?;

        if !state.accounts.contains_key(&account.id) {
            return Err(AuthError::AccountNotFound);
        }
        if let Some(field) = state.conflict(account) {
            return Err(AuthError::duplicate(field));
        }

        let mut updated = account.clone();
        updated.updated_at = Utc::now();
        state.accounts.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn record_login(&self, id: AccountId, at: DateTime<Utc>) -> Result<()> {
        let mut state = lock(&self.state)?;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(AuthError::AccountNotFound)?;
        account.last_login = Some(at);
        Ok(())
    }

    async fn find_link(
        &self,
        provider: OAuthProvider,
        provider_user_id: &str,
    ) -> Result<Option<OAuthLink>> {
        Ok(lock(&self.state)?
            .links
            .iter()
            .find(|l| l.provider == provider && l.provider_user_id == provider_user_id)
            .cloned())
    }

    async fn list_links(&self, account_id: AccountId) -> Result<Vec<OAuthLink>> {
        Ok(lock(&self.state)?
            .links
            .iter()
            .filter(|l| l.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn create_link(&self, link: &OAuthLink) -> Result<OAuthLink> {
        let mut state = lock(&self.state)?;

        if !state.accounts.contains_key(&link.account_id) {
            return Err(AuthError::AccountNotFound);
        }
        if state.link_exists(link.provider, &link.provider_user_id) {
            return Err(AuthError::duplicate("provider identity"));
        }

        state.links.push(link.clone());
        Ok(link.clone())
    }

    async fn update_link_tokens(&self, link: &OAuthLink) -> Result<()> {
        let mut state = lock(&self.state)?;
        let stored = state
            .links
            .iter_mut()
            .find(|l| l.id == link.id)
            .ok_or(AuthError::AccountNotFound)?;

        stored.access_token.clone_from(&link.access_token);
        stored.refresh_token.clone_from(&link.refresh_token);
        stored.expires_at = link.expires_at;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn create_with_link(&self, account: &Account, link: &OAuthLink) -> Result<Account> {
        let mut state = lock(&self.state)?;

        // Both checks happen before either insert, so a failure commits nothing.
        if let Some(field) = state.conflict(account) {
            return Err(AuthError::duplicate(field));
        }
        if state.link_exists(link.provider, &link.provider_user_id) {
            return Err(AuthError::duplicate("provider identity"));
        }

        state.accounts.insert(account.id, account.clone());
        state.links.push(link.clone());
        Ok(account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(email: &str, username: &str) -> Account {
        Account::new(email.to_string(), username.to_string(), "hash".to_string())
    }

    #[tokio::test]
    async fn test_unique_fields() {
        let repo = MockAccountRepository::new();
        repo.create(&account("a@example.com", "alice")).await.unwrap();

        let err = repo.create(&account("A@Example.com", "other")).await.unwrap_err();
        assert_eq!(err, AuthError::duplicate("email"));

        let err = repo.create(&account("b@example.com", "alice")).await.unwrap_err();
        assert_eq!(err, AuthError::duplicate("username"));

        assert_eq!(repo.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_pages_oldest_first() {
        let repo = MockAccountRepository::new();
        let mut ids = Vec::new();
        for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
            let mut created = account(&format!("{name}@example.com"), name);
            created.created_at += chrono::Duration::seconds(i64::try_from(i).unwrap());
            ids.push(repo.create(&created).await.unwrap().id);
        }

        let page: Vec<_> = repo.list(1, 5).await.unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(page, ids[1..]);
        assert!(repo.list(3, 5).await.unwrap().is_empty());
        assert_eq!(repo.list(0, 1).await.unwrap()[0].id, ids[0]);
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let repo = MockAccountRepository::new();
        let created = repo.create(&account("Mixed@Example.com", "mixed")).await.unwrap();

        let found = repo.get_by_email("mixed@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn test_create_with_link_is_all_or_nothing() {
        let repo = MockAccountRepository::new();
        let first = account("first@example.com", "first");
        let now = Utc::now();
        let link = OAuthLink {
            id: uuid::Uuid::new_v4(),
            provider: OAuthProvider::GitHub,
            provider_user_id: "42".into(),
            account_id: first.id,
            access_token: None,
            refresh_token: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        repo.create_with_link(&first, &link).await.unwrap();

        let second = account("second@example.com", "second");
        let duplicate_link = OAuthLink {
            id: uuid::Uuid::new_v4(),
            account_id: second.id,
            ..link
        };
        assert!(repo.create_with_link(&second, &duplicate_link).await.is_err());
        assert!(repo.get_by_email("second@example.com").await.unwrap().is_none());
    }
}
