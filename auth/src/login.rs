//! Login orchestration.
//!
//! [`LoginOrchestrator`] composes the credential store, token issuer, refresh
//! registry, rate limiter, two-factor engine, device registry and `OAuth`
//! linker into the externally visible flows.
//!
//! # Password login
//!
//! ```text
//! rate limit ─▶ verify password ─▶ touch device ─┬─▶ 2FA enabled: partial token
//!                                                 └─▶ otherwise: full session
//! ```
//!
//! Every decision after the rate limit writes one row to the login audit
//! log. Rows are only written for accounts that exist, so the log cannot be
//! used to probe for email addresses.

use crate::config::{AuthConfig, RateLimitConfig, RateLimitRule};
use crate::constants::{failure_reasons, login_methods};
use crate::credentials::CredentialStore;
use crate::crypto::SecretCipher;
use crate::devices::{AttemptRecord, DeviceRegistry};
use crate::environment::{AuthEnvironment, AuthProviders};
use crate::error::{AuthError, Result};
use crate::oauth::{AuthorizationRedirect, OAuthLinker};
use crate::providers::{
    Account, AccountRepository, Device, LoginAttempt, LoginStatus, NewAccount, ProfileUpdate,
    RefreshTokenRecord,
};
use crate::rate_limit::{enforce, enforce_key};
use crate::refresh::RefreshTokenRegistry;
use crate::state::{
    AccountId, DeviceId, LoginOutcome, OAuthProvider, PendingTwoFactor, RequestContext, TokenPair,
};
use crate::token::{Capability, TokenIssuer, TokenScope};
use crate::two_factor::{TwoFactorEngine, TwoFactorMethod, TwoFactorSetup, TwoFactorStatus};
use chrono::Utc;
use std::net::IpAddr;
use tracing::{info, warn};

/// Composed authentication flows.
///
/// Cheap to clone: every component is a handle over shared stores.
#[derive(Clone)]
pub struct LoginOrchestrator<P: AuthProviders> {
    accounts: P::Accounts,
    credentials: CredentialStore<P::Accounts, P::Hasher, P::Tokens, P::Email>,
    issuer: TokenIssuer,
    refresh: RefreshTokenRegistry<P::RefreshTokens, P::Accounts>,
    rate_limiter: P::RateLimiter,
    rate_limits: RateLimitConfig,
    two_factor: TwoFactorEngine<P::TwoFactor>,
    devices: DeviceRegistry<P::Devices, P::Attempts>,
    oauth: OAuthLinker<P::OAuth, P::Accounts, P::Hasher, P::Tokens>,
}

impl<P: AuthProviders> LoginOrchestrator<P> {
    /// Wire the services from an environment and configuration.
    #[must_use]
    pub fn new(env: AuthEnvironment<P>, config: AuthConfig) -> Self {
        let cipher = SecretCipher::from_secret(&config.two_factor.encryption_secret);

        Self {
            credentials: CredentialStore::new(
                env.accounts.clone(),
                env.hasher.clone(),
                env.tokens.clone(),
                env.email,
                config.recovery,
            ),
            refresh: RefreshTokenRegistry::new(
                env.refresh_tokens,
                env.accounts.clone(),
                config.tokens.refresh_token_ttl,
            ),
            two_factor: TwoFactorEngine::new(env.two_factor, &config.two_factor),
            devices: DeviceRegistry::new(env.devices, env.attempts, config.devices),
            oauth: OAuthLinker::new(
                env.oauth,
                env.accounts.clone(),
                env.hasher,
                env.tokens,
                config.oauth,
                cipher,
            ),
            issuer: TokenIssuer::new(config.tokens),
            rate_limiter: env.rate_limiter,
            rate_limits: config.rate_limits,
            accounts: env.accounts,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Component access (housekeeping, custom flows)
    // ═══════════════════════════════════════════════════════════════════

    /// Token issuer.
    #[must_use]
    pub const fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Credential store.
    #[must_use]
    pub const fn credentials(
        &self,
    ) -> &CredentialStore<P::Accounts, P::Hasher, P::Tokens, P::Email> {
        &self.credentials
    }

    /// Refresh token registry.
    #[must_use]
    pub const fn refresh_tokens(&self) -> &RefreshTokenRegistry<P::RefreshTokens, P::Accounts> {
        &self.refresh
    }

    /// Device registry.
    #[must_use]
    pub const fn devices(&self) -> &DeviceRegistry<P::Devices, P::Attempts> {
        &self.devices
    }

    /// Two-factor engine.
    #[must_use]
    pub const fn two_factor(&self) -> &TwoFactorEngine<P::TwoFactor> {
        &self.two_factor
    }

    /// Rate limiter.
    #[must_use]
    pub const fn rate_limiter(&self) -> &P::RateLimiter {
        &self.rate_limiter
    }

    /// Rate limit rules.
    #[must_use]
    pub const fn rate_limits(&self) -> &RateLimitConfig {
        &self.rate_limits
    }

    async fn admit(&self, rule: &RateLimitRule, context: &RequestContext) -> Result<()> {
        if !self.rate_limits.enabled {
            return Ok(());
        }
        enforce(&self.rate_limiter, rule, &context.ip_address.to_string())
            .await
            .map(|_| ())
    }

    /// Count one API request from `client` against the API-wide limit for
    /// `path`.
    ///
    /// A no-op when limiting is disabled or `path` is exempt.
    ///
    /// # Errors
    ///
    /// - `RateLimited` when the client exceeded the API-wide rule for `path`
    /// - Any limiter backend error
    pub async fn admit_request(&self, client: IpAddr, path: &str) -> Result<()> {
        if !self.rate_limits.enabled || !self.rate_limits.global_applies_to(path) {
            return Ok(());
        }
        let key = RateLimitRule::path_key(&client.to_string(), path);
        enforce_key(&self.rate_limiter, &key, &self.rate_limits.global)
            .await
            .map(|_| ())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Registration and sessions
    // ═══════════════════════════════════════════════════════════════════

    /// Register an account and send its verification email.
    ///
    /// # Errors
    ///
    /// - `RateLimited` when the caller exceeded the registration rule
    /// - Anything [`CredentialStore::register`] returns
    pub async fn register(&self, new: NewAccount, context: &RequestContext) -> Result<Account> {
        self.admit(&self.rate_limits.register, context).await?;

        let account = self.credentials.register(new).await?;
        if let Err(e) = self.credentials.issue_email_verification(&account).await {
            tracing::error!(account_id = %account.id, error = %e, "Verification email failed");
        }
        Ok(account)
    }

    /// Password login.
    ///
    /// # Errors
    ///
    /// - `RateLimited` when the caller exceeded the login rule
    /// - `InvalidCredentials` for an unknown email, wrong password or
    ///   deactivated account
    #[tracing::instrument(skip(self, password, context), fields(ip = %context.ip_address))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        context: &RequestContext,
    ) -> Result<LoginOutcome> {
        if let Err(e) = self.admit(&self.rate_limits.login, context).await {
            if let Ok(Some(account)) = self.credentials.lookup(email).await {
                self.audit_password(
                    account.id,
                    None,
                    context,
                    LoginStatus::Blocked,
                    Some(failure_reasons::RATE_LIMITED),
                )
                .await;
            }
            return Err(e);
        }

        let account = self.credentials.lookup(email).await?;
        let password_ok = self.credentials.verify_password(account.as_ref(), password).await?;

        let Some(account) = account else {
            warn!("Login for unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        if !password_ok {
            warn!(account_id = %account.id, "Login with wrong password");
            self.audit_password(
                account.id,
                None,
                context,
                LoginStatus::Failed,
                Some(failure_reasons::WRONG_PASSWORD),
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        }

        if !account.is_active {
            warn!(account_id = %account.id, "Login to deactivated account");
            self.audit_password(
                account.id,
                None,
                context,
                LoginStatus::Failed,
                Some(failure_reasons::ACCOUNT_DISABLED),
            )
            .await;
            return Err(AuthError::InvalidCredentials);
        }

        let device = self.devices.register_or_touch(account.id, context).await?;

        if self.two_factor.is_enabled(account.id).await? {
            self.audit_password(
                account.id,
                Some(&device.id),
                context,
                LoginStatus::PendingTwoFactor,
                None,
            )
            .await;

            let access_token = self.issuer.issue_partial_token(account.id, &device.id)?;
            info!(account_id = %account.id, "Password accepted, second factor required");
            return Ok(LoginOutcome::TwoFactorPending(PendingTwoFactor {
                access_token,
                requires_2fa: true,
                device_id: device.id,
                token_type: "bearer".to_string(),
                expires_in: self.issuer.config().partial_token_ttl.num_seconds(),
            }));
        }

        let tokens = self
            .complete_session(&account, &device.id, login_methods::PASSWORD, context)
            .await?;
        Ok(LoginOutcome::Authenticated(tokens))
    }

    /// Finish a login with the second factor.
    ///
    /// # Errors
    ///
    /// - `RateLimited` when the caller exceeded the 2FA rule
    /// - `InsufficientScope` or token errors for anything but a partial token
    /// - `InvalidTwoFactorCode` when neither TOTP nor a backup code matches
    pub async fn verify_two_factor(
        &self,
        partial_token: &str,
        code: &str,
        context: &RequestContext,
    ) -> Result<TokenPair> {
        self.admit(&self.rate_limits.two_factor, context).await?;

        let claims = self.issuer.verify(partial_token, Capability::TwoFactorVerification)?;
        let TokenScope::PendingTwoFactor { device_id } = claims.scope else {
            return Err(AuthError::InsufficientScope);
        };

        let account = self.active_account(claims.account_id).await?;

        match self.two_factor.verify(account.id, code).await {
            Ok(method) => {
                info!(account_id = %account.id, ?method, "Second factor accepted");
                self.devices.register_or_touch(account.id, context).await?;
                self.complete_session(&account, &device_id, login_methods::PASSWORD, context)
                    .await
            }
            Err(AuthError::InvalidTwoFactorCode) => {
                self.audit_password(
                    account.id,
                    Some(&device_id),
                    context,
                    LoginStatus::Failed,
                    Some(failure_reasons::INVALID_2FA_CODE),
                )
                .await;
                Err(AuthError::InvalidTwoFactorCode)
            }
            Err(e) => Err(e),
        }
    }

    /// Rotate a refresh token into a fresh session.
    ///
    /// # Errors
    ///
    /// - `RateLimited` when the caller exceeded the refresh rule
    /// - `TokenRevoked` for a replayed, revoked or unknown token, or a
    ///   deactivated account
    /// - Token errors for material that is not a refresh token
    pub async fn refresh(
        &self,
        refresh_token: &str,
        context: &RequestContext,
    ) -> Result<TokenPair> {
        self.admit(&self.rate_limits.refresh, context).await?;

        let claims = self.issuer.verify(refresh_token, Capability::Refresh)?;
        let account = self
            .accounts
            .get_by_id(claims.account_id)
            .await?
            .filter(|a| a.is_active)
            .ok_or(AuthError::TokenRevoked)?;

        let ttl = self.issuer.config().refresh_token_ttl;
        let new_refresh = self.issuer.issue_refresh_material(account.id, ttl)?;
        self.refresh.rotate(refresh_token, &new_refresh, context).await?;

        self.token_pair(account.id, new_refresh)
    }

    /// Revoke one refresh token.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    pub async fn logout(&self, refresh_token: &str) -> Result<bool> {
        self.refresh.revoke(refresh_token).await
    }

    /// Revoke every refresh token of the caller.
    ///
    /// # Errors
    ///
    /// Same as [`LoginOrchestrator::authenticate`].
    pub async fn logout_all(&self, access_token: &str) -> Result<u64> {
        let account = self.authenticate(access_token).await?;
        self.refresh.revoke_all(account.id).await
    }

    /// Resolve a bearer token to its account.
    ///
    /// # Errors
    ///
    /// - `InsufficientScope` for a partial token
    /// - Token errors for invalid tokens
    /// - `InvalidCredentials` if the account is gone or deactivated
    pub async fn authenticate(&self, access_token: &str) -> Result<Account> {
        let claims = self.issuer.verify(access_token, Capability::Session)?;
        self.active_account(claims.account_id).await
    }

    /// Active refresh sessions of an account.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    pub async fn list_sessions(&self, account_id: AccountId) -> Result<Vec<RefreshTokenRecord>> {
        self.refresh.list_active(account_id).await
    }

    async fn active_account(&self, account_id: AccountId) -> Result<Account> {
        self.accounts
            .get_by_id(account_id)
            .await?
            .filter(|a| a.is_active)
            .ok_or(AuthError::InvalidCredentials)
    }

    async fn complete_session(
        &self,
        account: &Account,
        device_id: &DeviceId,
        method: &str,
        context: &RequestContext,
    ) -> Result<TokenPair> {
        let refresh_token = self
            .issuer
            .issue_refresh_material(account.id, self.issuer.config().refresh_token_ttl)?;
        self.refresh.create(account.id, &refresh_token, context).await?;

        self.accounts.record_login(account.id, Utc::now()).await?;
        self.audit(account.id, Some(device_id), context, method, LoginStatus::Success, None)
            .await;

        info!(account_id = %account.id, method, "Session issued");
        self.token_pair(account.id, refresh_token)
    }

    fn token_pair(&self, account_id: AccountId, refresh_token: String) -> Result<TokenPair> {
        let ttl = self.issuer.config().access_token_ttl;
        let access_token = self.issuer.issue_access_token(account_id, ttl)?;
        Ok(TokenPair::bearer(access_token, refresh_token, ttl.num_seconds()))
    }

    async fn audit_password(
        &self,
        account_id: AccountId,
        device_id: Option<&DeviceId>,
        context: &RequestContext,
        status: LoginStatus,
        failure_reason: Option<&str>,
    ) {
        self.audit(
            account_id,
            device_id,
            context,
            login_methods::PASSWORD,
            status,
            failure_reason,
        )
        .await;
    }

    async fn audit(
        &self,
        account_id: AccountId,
        device_id: Option<&DeviceId>,
        context: &RequestContext,
        method: &str,
        status: LoginStatus,
        failure_reason: Option<&str>,
    ) {
        self.devices
            .record_attempt(AttemptRecord {
                account_id,
                device_id,
                context,
                method,
                status,
                failure_reason,
            })
            .await;
    }

    // ═══════════════════════════════════════════════════════════════════
    // Profile, password and email
    // ═══════════════════════════════════════════════════════════════════

    /// Update profile fields.
    ///
    /// # Errors
    ///
    /// See [`CredentialStore::update_profile`].
    pub async fn update_profile(
        &self,
        account_id: AccountId,
        update: ProfileUpdate,
    ) -> Result<Account> {
        self.credentials.update_profile(account_id, update).await
    }

    /// Change the password and end every session.
    ///
    /// # Errors
    ///
    /// See [`CredentialStore::change_password`].
    pub async fn change_password(
        &self,
        account_id: AccountId,
        current: &str,
        new_password: &str,
    ) -> Result<()> {
        self.credentials
            .change_password(account_id, current, new_password)
            .await?;
        self.refresh.revoke_all(account_id).await?;
        Ok(())
    }

    /// Request a password reset email.
    ///
    /// # Errors
    ///
    /// Only `RateLimited`; the outcome for the email itself is never revealed.
    pub async fn request_password_reset(
        &self,
        email: &str,
        context: &RequestContext,
    ) -> Result<()> {
        self.admit(&self.rate_limits.password_reset, context).await?;
        self.credentials.request_password_reset(email).await
    }

    /// Whether a reset token is still valid.
    ///
    /// # Errors
    ///
    /// Returns error if the token store is unavailable.
    pub async fn validate_reset_token(&self, token: &str) -> Result<bool> {
        self.credentials.validate_reset_token(token).await
    }

    /// Complete a password reset and end every session.
    ///
    /// # Errors
    ///
    /// See [`CredentialStore::reset_password`].
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        let account_id = self.credentials.reset_password(token, new_password).await?;
        self.refresh.revoke_all(account_id).await?;
        Ok(())
    }

    /// Confirm an email address.
    ///
    /// # Errors
    ///
    /// Returns `InvalidVerificationToken` for a bad token.
    pub async fn verify_email(&self, token: &str) -> Result<Account> {
        self.credentials.verify_email(token).await
    }

    /// Send a new verification email.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` or delivery errors.
    pub async fn resend_verification(&self, account_id: AccountId) -> Result<()> {
        let account = self
            .accounts
            .get_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;
        self.credentials.issue_email_verification(&account).await
    }

    // ═══════════════════════════════════════════════════════════════════
    // Two-factor management
    // ═══════════════════════════════════════════════════════════════════

    /// Begin two-factor setup.
    ///
    /// # Errors
    ///
    /// See [`TwoFactorEngine::setup`].
    pub async fn setup_two_factor(&self, account: &Account) -> Result<TwoFactorSetup> {
        self.two_factor.setup(account.id, &account.email).await
    }

    /// Confirm two-factor setup.
    ///
    /// # Errors
    ///
    /// See [`TwoFactorEngine::enable`].
    pub async fn enable_two_factor(&self, account_id: AccountId, code: &str) -> Result<()> {
        self.two_factor.enable(account_id, code).await
    }

    /// Turn two-factor off.
    ///
    /// # Errors
    ///
    /// See [`TwoFactorEngine::disable`].
    pub async fn disable_two_factor(&self, account_id: AccountId) -> Result<()> {
        self.two_factor.disable(account_id).await
    }

    /// Replace the backup codes.
    ///
    /// # Errors
    ///
    /// See [`TwoFactorEngine::regenerate_backup_codes`].
    pub async fn regenerate_backup_codes(&self, account_id: AccountId) -> Result<Vec<String>> {
        self.two_factor.regenerate_backup_codes(account_id).await
    }

    /// Check a second-factor code for a signed-in account.
    ///
    /// A matching backup code is consumed, as at login.
    ///
    /// # Errors
    ///
    /// - `RateLimited` when the caller exceeded the 2FA rule
    /// - See [`TwoFactorEngine::verify`]
    pub async fn check_two_factor(
        &self,
        account_id: AccountId,
        code: &str,
        context: &RequestContext,
    ) -> Result<TwoFactorMethod> {
        self.admit(&self.rate_limits.two_factor, context).await?;
        self.two_factor.verify(account_id, code).await
    }

    /// Two-factor summary.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    pub async fn two_factor_status(&self, account_id: AccountId) -> Result<TwoFactorStatus> {
        self.two_factor.status(account_id).await
    }

    // ═══════════════════════════════════════════════════════════════════
    // Devices and history
    // ═══════════════════════════════════════════════════════════════════

    /// Devices of an account.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    pub async fn list_devices(&self, account_id: AccountId) -> Result<Vec<Device>> {
        self.devices.list(account_id).await
    }

    /// Set a device's trust flag.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` for devices of other accounts.
    pub async fn trust_device(
        &self,
        account_id: AccountId,
        device_id: &DeviceId,
        trusted: bool,
    ) -> Result<Device> {
        self.devices.trust(account_id, device_id, trusted).await
    }

    /// Forget a device.
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` for devices of other accounts.
    pub async fn remove_device(&self, account_id: AccountId, device_id: &DeviceId) -> Result<()> {
        self.devices.remove(account_id, device_id).await
    }

    /// Login history, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the log is unavailable.
    pub async fn login_history(
        &self,
        account_id: AccountId,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<LoginAttempt>> {
        self.devices.login_history(account_id, limit, offset).await
    }

    // ═══════════════════════════════════════════════════════════════════
    // Administration
    // ═══════════════════════════════════════════════════════════════════

    /// A page of accounts, oldest first.
    ///
    /// Callers gate this on [`Account::is_superuser`].
    ///
    /// # Errors
    ///
    /// Returns error if the store is unavailable.
    pub async fn list_accounts(&self, offset: usize, limit: usize) -> Result<Vec<Account>> {
        self.accounts.list(offset, limit).await
    }

    /// Any account by id.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` for an unknown id.
    pub async fn get_account(&self, account_id: AccountId) -> Result<Account> {
        self.accounts
            .get_by_id(account_id)
            .await?
            .ok_or(AuthError::AccountNotFound)
    }

    // ═══════════════════════════════════════════════════════════════════
    // External identities
    // ═══════════════════════════════════════════════════════════════════

    /// Providers users may sign in with.
    #[must_use]
    pub fn oauth_providers(&self) -> Vec<OAuthProvider> {
        self.oauth.available_providers()
    }

    /// Start an `OAuth` sign-in.
    ///
    /// # Errors
    ///
    /// See [`OAuthLinker::authorization_url`].
    pub async fn oauth_authorization_url(
        &self,
        provider: OAuthProvider,
    ) -> Result<AuthorizationRedirect> {
        self.oauth.authorization_url(provider).await
    }

    /// Complete an `OAuth` sign-in with a full session.
    ///
    /// # Errors
    ///
    /// See [`OAuthLinker::handle_callback`].
    pub async fn oauth_login(
        &self,
        provider: OAuthProvider,
        code: &str,
        state: &str,
        context: &RequestContext,
    ) -> Result<TokenPair> {
        let resolution = self.oauth.handle_callback(provider, code, state).await?;
        let device = self
            .devices
            .register_or_touch(resolution.account.id, context)
            .await?;

        let method = format!("{}{}", login_methods::OAUTH_PREFIX, provider.as_str());
        self.complete_session(&resolution.account, &device.id, &method, context)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::InMemoryProviders;
    use std::net::{IpAddr, Ipv4Addr};

    fn orchestrator() -> LoginOrchestrator<InMemoryProviders> {
        LoginOrchestrator::new(
            AuthEnvironment::in_memory(),
            AuthConfig::new("test-secret", "Sentinel"),
        )
    }

    fn ctx() -> RequestContext {
        RequestContext::new(
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7)),
            "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
        )
    }

    async fn register(o: &LoginOrchestrator<InMemoryProviders>) -> Account {
        o.register(
            NewAccount {
                email: "jane@example.com".into(),
                username: "jane".into(),
                password: "password123".into(),
                full_name: None,
                phone: None,
            },
            &ctx(),
        )
        .await
        .unwrap()
    }

    fn session(outcome: LoginOutcome) -> TokenPair {
        match outcome {
            LoginOutcome::Authenticated(tokens) => tokens,
            LoginOutcome::TwoFactorPending(_) => panic!("expected a full session"),
        }
    }

    #[tokio::test]
    async fn test_login_issues_distinct_sessions() {
        let o = orchestrator();
        let account = register(&o).await;

        let first = session(o.login("jane@example.com", "password123", &ctx()).await.unwrap());
        let second = session(o.login("jane@example.com", "password123", &ctx()).await.unwrap());

        assert_ne!(first.refresh_token, second.refresh_token);
        assert_eq!(first.token_type, "bearer");
        assert_eq!(o.list_sessions(account.id).await.unwrap().len(), 2);
        assert_eq!(o.authenticate(&first.access_token).await.unwrap().id, account.id);
    }

    #[tokio::test]
    async fn test_unknown_email_and_wrong_password_match() {
        let o = orchestrator();
        let account = register(&o).await;

        assert_eq!(
            o.login("ghost@example.com", "password123", &ctx()).await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            o.login("jane@example.com", "nope-nope", &ctx()).await,
            Err(AuthError::InvalidCredentials)
        );

        let history = o.login_history(account.id, None, 0).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].failure_reason.as_deref(), Some(failure_reasons::WRONG_PASSWORD));
    }

    #[tokio::test]
    async fn test_refresh_rotation_and_replay() {
        let o = orchestrator();
        register(&o).await;
        let tokens = session(o.login("jane@example.com", "password123", &ctx()).await.unwrap());

        let rotated = o.refresh(&tokens.refresh_token, &ctx()).await.unwrap();
        assert_ne!(rotated.refresh_token, tokens.refresh_token);
        assert_eq!(o.refresh(&tokens.refresh_token, &ctx()).await, Err(AuthError::TokenRevoked));

        assert!(matches!(
            o.refresh(&rotated.access_token, &ctx()).await,
            Err(AuthError::TokenMalformed)
        ));
    }

    #[tokio::test]
    async fn test_logout_all_and_password_change_revoke_sessions() {
        let o = orchestrator();
        let account = register(&o).await;
        let a = session(o.login("jane@example.com", "password123", &ctx()).await.unwrap());
        session(o.login("jane@example.com", "password123", &ctx()).await.unwrap());

        assert_eq!(o.logout_all(&a.access_token).await.unwrap(), 2);
        assert_eq!(o.refresh(&a.refresh_token, &ctx()).await, Err(AuthError::TokenRevoked));

        let b = session(o.login("jane@example.com", "password123", &ctx()).await.unwrap());
        o.change_password(account.id, "password123", "brand-new-pass").await.unwrap();
        assert_eq!(o.refresh(&b.refresh_token, &ctx()).await, Err(AuthError::TokenRevoked));
    }

    #[tokio::test]
    async fn test_deactivated_account_cannot_login() {
        let o = orchestrator();
        let mut account = register(&o).await;
        account.is_active = false;
        o.accounts.update(&account).await.unwrap();

        assert_eq!(
            o.login("jane@example.com", "password123", &ctx()).await,
            Err(AuthError::InvalidCredentials)
        );
        let history = o.login_history(account.id, None, 0).await.unwrap();
        assert_eq!(history[0].failure_reason.as_deref(), Some(failure_reasons::ACCOUNT_DISABLED));
    }

    #[tokio::test]
    async fn test_failed_refresh_insert_leaves_no_success_trace() {
        let env = AuthEnvironment::in_memory();
        let refresh_tokens = env.refresh_tokens.clone();
        let o = LoginOrchestrator::new(env, AuthConfig::new("test-secret", "Sentinel"));
        let account = register(&o).await;

        refresh_tokens.fail_inserts(true);
        assert!(matches!(
            o.login("jane@example.com", "password123", &ctx()).await,
            Err(AuthError::DatabaseError(_))
        ));

        let history = o.login_history(account.id, None, 0).await.unwrap();
        assert!(history.iter().all(|a| a.status != LoginStatus::Success));
        let stored = o.accounts.get_by_id(account.id).await.unwrap().unwrap();
        assert!(stored.last_login.is_none());

        refresh_tokens.fail_inserts(false);
        session(o.login("jane@example.com", "password123", &ctx()).await.unwrap());
        let history = o.login_history(account.id, None, 0).await.unwrap();
        assert_eq!(history[0].status, LoginStatus::Success);
    }

    #[tokio::test]
    async fn test_account_listing_pages_and_lookup() {
        let o = orchestrator();
        let first = register(&o).await;
        let second = o
            .register(
                NewAccount {
                    email: "john@example.com".into(),
                    username: "john".into(),
                    password: "password123".into(),
                    full_name: None,
                    phone: None,
                },
                &ctx(),
            )
            .await
            .unwrap();

        let all = o.list_accounts(0, 100).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(o.list_accounts(1, 100).await.unwrap().len(), 1);
        assert!(o.list_accounts(0, 0).await.unwrap().is_empty());

        assert_eq!(o.get_account(second.id).await.unwrap().email, "john@example.com");
        assert_eq!(o.get_account(first.id).await.unwrap().id, first.id);
        assert_eq!(
            o.get_account(AccountId(uuid::Uuid::new_v4())).await,
            Err(AuthError::AccountNotFound)
        );
    }

    #[tokio::test]
    async fn test_oauth_login_issues_session() {
        let o = orchestrator();
        let redirect = o.oauth_authorization_url(OAuthProvider::Google).await.unwrap();

        let tokens = o
            .oauth_login(OAuthProvider::Google, "code", &redirect.state, &ctx())
            .await
            .unwrap();

        let account = o.authenticate(&tokens.access_token).await.unwrap();
        assert_eq!(account.email, "oauth@example.com");
        let history = o.login_history(account.id, None, 0).await.unwrap();
        assert_eq!(history[0].login_method, "oauth_google");
        assert_eq!(history[0].status, LoginStatus::Success);
    }
}
