//! Account repository trait.
//!
//! External identity links are part of the account aggregate and live on the
//! same repository so that "create account and link it" is one transaction.

use crate::error::Result;
use crate::providers::{Account, OAuthLink};
use crate::state::{AccountId, OAuthProvider};
use chrono::{DateTime, Utc};

/// Account and external identity storage.
///
/// # Uniqueness
///
/// Implementations enforce unique `email`, `username`, `phone` (when present)
/// and `(provider, provider_user_id)`. Violations surface as
/// [`crate::AuthError::DuplicateAccount`] naming the field.
pub trait AccountRepository: Send + Sync {
    /// Find an account by ID.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn get_by_id(
        &self,
        account_id: AccountId,
    ) -> impl std::future::Future<Output = Result<Option<Account>>> + Send;

    /// Find an account by email (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn get_by_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<Option<Account>>> + Send;

    /// Find an account by username.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn get_by_username(
        &self,
        username: &str,
    ) -> impl std::future::Future<Output = Result<Option<Account>>> + Send;

    /// Find an account by phone number.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn get_by_phone(
        &self,
        phone: &str,
    ) -> impl std::future::Future<Output = Result<Option<Account>>> + Send;

    /// Accounts ordered by creation time, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn list(
        &self,
        offset: usize,
        limit: usize,
    ) -> impl std::future::Future<Output = Result<Vec<Account>>> + Send;

    /// Insert a new account.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAccount` on a uniqueness violation.
    fn create(
        &self,
        account: &Account,
    ) -> impl std::future::Future<Output = Result<Account>> + Send;

    /// Replace the mutable fields of an existing account.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` if the account does not exist, or
    /// `DuplicateAccount` on a uniqueness violation.
    fn update(
        &self,
        account: &Account,
    ) -> impl std::future::Future<Output = Result<Account>> + Send;

    /// Stamp the last successful login.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn record_login(
        &self,
        account_id: AccountId,
        at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Find the link for a provider identity.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn find_link(
        &self,
        provider: OAuthProvider,
        provider_user_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<OAuthLink>>> + Send;

    /// Links held by an account.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn list_links(
        &self,
        account_id: AccountId,
    ) -> impl std::future::Future<Output = Result<Vec<OAuthLink>>> + Send;

    /// Insert a link for an existing account.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAccount` if the identity is already linked.
    fn create_link(
        &self,
        link: &OAuthLink,
    ) -> impl std::future::Future<Output = Result<OAuthLink>> + Send;

    /// Replace the stored provider tokens of a link.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    fn update_link_tokens(
        &self,
        link: &OAuthLink,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Insert an account and its first link atomically.
    ///
    /// Either both rows are committed or neither is.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateAccount` on any uniqueness violation.
    fn create_with_link(
        &self,
        account: &Account,
        link: &OAuthLink,
    ) -> impl std::future::Future<Output = Result<Account>> + Send;
}
