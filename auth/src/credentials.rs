//! Account identity, password verification and account recovery.
//!
//! # Enumeration safety
//!
//! Unknown email, wrong password and deactivated account are indistinguishable
//! to callers: all three return [`AuthError::InvalidCredentials`], and an
//! unknown email still pays for one password verification against a dummy
//! hash. Password reset requests succeed whether or not the email exists.
//!
//! # One-time tokens
//!
//! Reset and verification tokens are random 256-bit values. Only their
//! SHA-256 digest reaches the [`TokenStore`], under the id
//! `{purpose}:{digest}`.

use crate::config::AccountRecoveryConfig;
use crate::crypto::{random_urlsafe_token, sha256_hex};
use crate::error::{AuthError, Result};
use crate::providers::{
    Account, AccountRepository, EmailProvider, NewAccount, PasswordHasher, ProfileUpdate,
    TokenData, TokenStore, TokenType,
};
use crate::state::AccountId;
use crate::utils::{is_valid_email, is_valid_username};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

const DUMMY_PASSWORD: &str = "sentinel-dummy-password-for-timing";
const RESET_PREFIX: &str = "password_reset";
const VERIFICATION_PREFIX: &str = "email_verification";

/// Account registration, credential checks and recovery flows.
///
/// # Type Parameters
///
/// - `A`: Account repository
/// - `H`: Password hasher
/// - `T`: One-time token store
/// - `E`: Email provider
#[derive(Clone)]
pub struct CredentialStore<A, H, T, E> {
    accounts: A,
    hasher: H,
    tokens: T,
    email: E,
    config: AccountRecoveryConfig,
    dummy_hash: Arc<OnceCell<String>>,
}

impl<A, H, T, E> CredentialStore<A, H, T, E>
where
    A: AccountRepository,
    H: PasswordHasher,
    T: TokenStore,
    E: EmailProvider,
{
    /// Create a credential store.
    #[must_use]
    pub fn new(accounts: A, hasher: H, tokens: T, email: E, config: AccountRecoveryConfig) -> Self {
        Self {
            accounts,
            hasher,
            tokens,
            email,
            config,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    /// Hash a password with the configured hasher.
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails.
    pub async fn hash_password(&self, password: &str) -> Result<String> {
        self.hasher.hash(password).await
    }

    fn validate_password(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.config.min_password_length {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                self.config.min_password_length
            )));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Registration and login
    // ═══════════════════════════════════════════════════════════════════

    /// Register a new account.
    ///
    /// Duplicate checks run email, then username, then phone; the repository
    /// enforces the same constraints for concurrent registrations.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed email, username or short password
    /// - `DuplicateAccount { field }` when a unique field is taken
    pub async fn register(&self, new: NewAccount) -> Result<Account> {
        let email = new.email.trim().to_lowercase();
        let username = new.username.trim().to_string();
        let phone = new.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());

        if !is_valid_email(&email) {
            return Err(AuthError::Validation("Invalid email address".into()));
        }
        if !is_valid_username(&username) {
            return Err(AuthError::Validation(
                "Username must be 3-50 characters of letters, digits, '_' or '-'".into(),
            ));
        }
        self.validate_password(&new.password)?;

        if self.accounts.get_by_email(&email).await?.is_some() {
            return Err(AuthError::duplicate("email"));
        }
        if self.accounts.get_by_username(&username).await?.is_some() {
            return Err(AuthError::duplicate("username"));
        }
        if let Some(phone) = &phone {
            if self.accounts.get_by_phone(phone).await?.is_some() {
                return Err(AuthError::duplicate("phone"));
            }
        }

        let password_hash = self.hasher.hash(&new.password).await?;
        let mut account = Account::new(email, username, password_hash);
        account.full_name = new.full_name.filter(|n| !n.trim().is_empty());
        account.phone = phone;

        let account = self.accounts.create(&account).await?;
        info!(account_id = %account.id, "Account registered");
        Ok(account)
    }

    /// Look up an account by email.
    ///
    /// # Errors
    ///
    /// Returns error if the repository is unavailable.
    pub async fn lookup(&self, email: &str) -> Result<Option<Account>> {
        self.accounts.get_by_email(email.trim()).await
    }

    /// Check a password against an account, or against a dummy hash when
    /// the account is unknown so both paths cost one verification.
    ///
    /// # Errors
    ///
    /// Returns error if the hasher fails.
    pub async fn verify_password(&self, account: Option<&Account>, password: &str) -> Result<bool> {
        match account {
            Some(account) => self.hasher.verify(password, &account.password_hash).await,
            None => {
                let dummy = self
                    .dummy_hash
                    .get_or_try_init(|| self.hasher.hash(DUMMY_PASSWORD))
                    .await?;
                self.hasher.verify(password, dummy).await?;
                Ok(false)
            }
        }
    }

    /// Verify an email/password pair.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredentials` for unknown email, wrong password and
    /// deactivated accounts alike.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Account> {
        let account = self.lookup(email).await?;
        let valid = self.verify_password(account.as_ref(), password).await?;

        match account {
            Some(account) if valid && account.is_active => Ok(account),
            Some(account) => {
                warn!(account_id = %account.id, "Password authentication rejected");
                Err(AuthError::InvalidCredentials)
            }
            None => {
                warn!("Password authentication for unknown email");
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Profile and password management
    // ═══════════════════════════════════════════════════════════════════

    /// Update profile fields. An empty phone clears it.
    ///
    /// # Errors
    ///
    /// - `AccountNotFound` if the account does not exist
    /// - `DuplicateAccount { field: "phone" }` if the phone belongs to another account
    pub async fn update_profile(
        &self,
        account_id: AccountId,
        update: ProfileUpdate,
    ) -> Result<Account> {
        let mut account = self
            .accounts
            .get_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if let Some(full_name) = update.full_name {
            account.full_name = Some(full_name).filter(|n| !n.trim().is_empty());
        }

        if let Some(phone) = update.phone {
            let phone = phone.trim().to_string();
            if phone.is_empty() {
                account.phone = None;
            } else {
                if let Some(owner) = self.accounts.get_by_phone(&phone).await? {
                    if owner.id != account_id {
                        return Err(AuthError::duplicate("phone"));
                    }
                }
                account.phone = Some(phone);
            }
        }

        if let Some(avatar_url) = update.avatar_url {
            account.avatar_url = Some(avatar_url).filter(|u| !u.is_empty());
        }

        self.accounts.update(&account).await
    }

    /// Replace the password after checking the current one.
    ///
    /// # Errors
    ///
    /// - `InvalidCredentials` if `current` does not match
    /// - `Validation` if `new_password` is too short
    pub async fn change_password(
        &self,
        account_id: AccountId,
        current: &str,
        new_password: &str,
    ) -> Result<()> {
        let mut account = self
            .accounts
            .get_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !self.hasher.verify(current, &account.password_hash).await? {
            warn!(account_id = %account_id, "Password change with wrong current password");
            return Err(AuthError::InvalidCredentials);
        }
        self.validate_password(new_password)?;

        account.password_hash = self.hasher.hash(new_password).await?;
        self.accounts.update(&account).await?;

        info!(account_id = %account_id, "Password changed");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Password reset
    // ═══════════════════════════════════════════════════════════════════

    /// Start a password reset.
    ///
    /// Always succeeds. When an active account owns `email`, a one-hour reset
    /// token is stored and emailed; failures along that path are logged only.
    ///
    /// # Errors
    ///
    /// Never returns an error; the `Result` keeps the call shape uniform.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        match self.lookup(email).await {
            Ok(Some(account)) if account.is_active => {
                if let Err(e) = self.send_reset(&account).await {
                    tracing::error!(
                        account_id = %account.id,
                        error = %e,
                        "Password reset delivery failed"
                    );
                }
            }
            Ok(_) => {
                info!("Password reset requested for unknown or inactive account");
            }
            Err(e) => {
                tracing::error!(error = %e, "Password reset lookup failed");
            }
        }
        Ok(())
    }

    async fn send_reset(&self, account: &Account) -> Result<()> {
        let token = random_urlsafe_token(32);
        let digest = sha256_hex(&token);
        let expires_at = Utc::now() + self.config.reset_token_ttl;

        self.tokens
            .store_token(
                &format!("{RESET_PREFIX}:{digest}"),
                TokenData::new(
                    TokenType::PasswordReset,
                    digest,
                    serde_json::json!({ "account_id": account.id.to_string() }),
                    expires_at,
                ),
            )
            .await?;

        let base_url = format!("{}/reset-password", self.config.frontend_url.trim_end_matches('/'));
        self.email
            .send_password_reset(&account.email, &token, &base_url, expires_at)
            .await?;

        info!(account_id = %account.id, "Password reset token issued");
        Ok(())
    }

    /// Whether a reset token is currently valid, without consuming it.
    ///
    /// # Errors
    ///
    /// Returns error if the token store is unavailable.
    pub async fn validate_reset_token(&self, token: &str) -> Result<bool> {
        let digest = sha256_hex(token);
        Ok(self
            .tokens
            .peek_token(&format!("{RESET_PREFIX}:{digest}"))
            .await?
            .is_some_and(|t| t.token_type == TokenType::PasswordReset))
    }

    /// Consume a reset token and set a new password.
    ///
    /// The password is validated before the token is consumed, so a rejected
    /// password leaves the token usable.
    ///
    /// # Errors
    ///
    /// - `Validation` if the password is too short
    /// - `InvalidResetToken` if the token is unknown, used or expired, or the
    ///   account is gone or deactivated
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<AccountId> {
        self.validate_password(new_password)?;

        let data = self
            .consume(RESET_PREFIX, TokenType::PasswordReset, token)
            .await?
            .ok_or(AuthError::InvalidResetToken)?;
        let account_id = account_id_from(&data).ok_or(AuthError::InvalidResetToken)?;

        let mut account = self
            .accounts
            .get_by_id(account_id)
            .await?
            .filter(|a| a.is_active)
            .ok_or(AuthError::InvalidResetToken)?;

        account.password_hash = self.hasher.hash(new_password).await?;
        self.accounts.update(&account).await?;

        info!(account_id = %account_id, "Password reset completed");
        Ok(account_id)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Email verification
    // ═══════════════════════════════════════════════════════════════════

    /// Issue and email a 24-hour verification token.
    ///
    /// Already verified accounts are left alone.
    ///
    /// # Errors
    ///
    /// Returns error if the token store or email provider fails.
    pub async fn issue_email_verification(&self, account: &Account) -> Result<()> {
        if account.is_verified {
            return Ok(());
        }

        let token = random_urlsafe_token(32);
        let digest = sha256_hex(&token);

        self.tokens
            .store_token(
                &format!("{VERIFICATION_PREFIX}:{digest}"),
                TokenData::new(
                    TokenType::EmailVerification,
                    digest,
                    serde_json::json!({ "account_id": account.id.to_string() }),
                    Utc::now() + self.config.verification_token_ttl,
                ),
            )
            .await?;

        let base_url = format!("{}/verify-email", self.config.frontend_url.trim_end_matches('/'));
        self.email
            .send_verification_email(&account.email, &token, &base_url)
            .await?;

        info!(account_id = %account.id, "Verification email issued");
        Ok(())
    }

    /// Consume a verification token and mark the account verified.
    ///
    /// # Errors
    ///
    /// Returns `InvalidVerificationToken` if the token is unknown, used or expired.
    pub async fn verify_email(&self, token: &str) -> Result<Account> {
        let data = self
            .consume(VERIFICATION_PREFIX, TokenType::EmailVerification, token)
            .await?
            .ok_or(AuthError::InvalidVerificationToken)?;
        let account_id = account_id_from(&data).ok_or(AuthError::InvalidVerificationToken)?;

        let mut account = self
            .accounts
            .get_by_id(account_id)
            .await?
            .ok_or(AuthError::InvalidVerificationToken)?;

        account.is_verified = true;
        let account = self.accounts.update(&account).await?;

        info!(account_id = %account_id, "Email verified");
        Ok(account)
    }

    /// Drop expired reset, verification and `OAuth` state tokens.
    ///
    /// # Errors
    ///
    /// Returns error if the token store is unavailable.
    pub async fn purge_expired_tokens(&self) -> Result<u64> {
        self.tokens.purge_expired(Utc::now()).await
    }

    async fn consume(
        &self,
        prefix: &str,
        kind: TokenType,
        token: &str,
    ) -> Result<Option<TokenData>> {
        let digest = sha256_hex(token);
        Ok(self
            .tokens
            .consume_token(&format!("{prefix}:{digest}"), &digest)
            .await?
            .filter(|t| t.token_type == kind))
    }
}

fn account_id_from(data: &TokenData) -> Option<AccountId> {
    data.data.get("account_id")?.as_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{
        EmailKind, MockAccountRepository, MockEmailProvider, MockPasswordHasher, MockTokenStore,
    };

    type Store = CredentialStore<
        MockAccountRepository,
        MockPasswordHasher,
        MockTokenStore,
        MockEmailProvider,
    >;

    fn store() -> (Store, MockEmailProvider) {
        let email = MockEmailProvider::new();
        let store = CredentialStore::new(
            MockAccountRepository::new(),
            MockPasswordHasher::new(),
            MockTokenStore::new(),
            email.clone(),
            AccountRecoveryConfig::default(),
        );
        (store, email)
    }

    fn new_account(email: &str, username: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            username: username.to_string(),
            password: "password123".to_string(),
            full_name: None,
            phone: None,
        }
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let (store, _) = store();
        let account = store.register(new_account("Jane@Example.com", "jane")).await.unwrap();

        assert_eq!(account.email, "jane@example.com");
        assert!(account.is_active);
        assert!(!account.is_verified);

        let authed = store.authenticate("jane@example.com", "password123").await.unwrap();
        assert_eq!(authed.id, account.id);
    }

    #[tokio::test]
    async fn test_duplicate_order_is_email_username_phone() {
        let (store, _) = store();
        let mut first = new_account("a@example.com", "alice");
        first.phone = Some("+15550001".into());
        store.register(first).await.unwrap();

        let err = store.register(new_account("a@example.com", "alice")).await.unwrap_err();
        assert_eq!(err, AuthError::duplicate("email"));

        let err = store.register(new_account("b@example.com", "alice")).await.unwrap_err();
        assert_eq!(err, AuthError::duplicate("username"));

        let mut third = new_account("c@example.com", "carol");
        third.phone = Some("+15550001".into());
        assert_eq!(store.register(third).await.unwrap_err(), AuthError::duplicate("phone"));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (store, _) = store();

        let mut short = new_account("s@example.com", "shorty");
        short.password = "1234567".into();
        assert!(matches!(store.register(short).await, Err(AuthError::Validation(_))));

        assert!(matches!(
            store.register(new_account("not-an-email", "valid_name")).await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            store.register(new_account("ok@example.com", "no spaces")).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_authentication_failures_are_indistinguishable() {
        let (store, _) = store();
        store.register(new_account("a@example.com", "alice")).await.unwrap();

        let unknown = store.authenticate("nobody@example.com", "password123").await;
        let wrong = store.authenticate("a@example.com", "wrong-password").await;

        assert_eq!(unknown, Err(AuthError::InvalidCredentials));
        assert_eq!(wrong, Err(AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let (store, email) = store();
        let account = store.register(new_account("a@example.com", "alice")).await.unwrap();

        store.request_password_reset("a@example.com").await.unwrap();
        let token = email
            .last_token("a@example.com", EmailKind::PasswordReset)
            .unwrap()
            .unwrap();

        assert!(store.validate_reset_token(&token).await.unwrap());
        assert!(matches!(
            store.reset_password(&token, "short").await,
            Err(AuthError::Validation(_))
        ));

        let reset = store.reset_password(&token, "new-password-1").await.unwrap();
        assert_eq!(reset, account.id);

        assert!(store.authenticate("a@example.com", "new-password-1").await.is_ok());
        assert_eq!(
            store.reset_password(&token, "another-password").await,
            Err(AuthError::InvalidResetToken)
        );
    }

    #[tokio::test]
    async fn test_password_reset_for_unknown_email_is_silent() {
        let (store, email) = store();
        store.request_password_reset("ghost@example.com").await.unwrap();
        assert!(email.sent().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_email_verification() {
        let (store, email) = store();
        let account = store.register(new_account("a@example.com", "alice")).await.unwrap();

        store.issue_email_verification(&account).await.unwrap();
        let token = email
            .last_token("a@example.com", EmailKind::Verification)
            .unwrap()
            .unwrap();

        let verified = store.verify_email(&token).await.unwrap();
        assert!(verified.is_verified);
        assert_eq!(store.verify_email(&token).await, Err(AuthError::InvalidVerificationToken));
    }

    #[tokio::test]
    async fn test_reset_token_cannot_verify_email() {
        let (store, email) = store();
        store.register(new_account("a@example.com", "alice")).await.unwrap();
        store.request_password_reset("a@example.com").await.unwrap();
        let token = email
            .last_token("a@example.com", EmailKind::PasswordReset)
            .unwrap()
            .unwrap();

        assert_eq!(store.verify_email(&token).await, Err(AuthError::InvalidVerificationToken));
    }

    #[tokio::test]
    async fn test_change_password_and_profile() {
        let (store, _) = store();
        let account = store.register(new_account("a@example.com", "alice")).await.unwrap();

        assert_eq!(
            store.change_password(account.id, "wrong", "new-password-1").await,
            Err(AuthError::InvalidCredentials)
        );
        store
            .change_password(account.id, "password123", "new-password-1")
            .await
            .unwrap();

        let updated = store
            .update_profile(
                account.id,
                ProfileUpdate {
                    full_name: Some("Alice".into()),
                    phone: Some("+15550002".into()),
                    avatar_url: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.full_name.as_deref(), Some("Alice"));
        assert_eq!(updated.phone.as_deref(), Some("+15550002"));
    }
}
