//! Authentication environment.
//!
//! This module defines the environment type for dependency injection into
//! the auth services. A deployment names its concrete providers once, as an
//! [`AuthProviders`] bundle, and hands the instances to [`AuthEnvironment`].

use crate::providers::{
    AccountRepository, DeviceRepository, EmailProvider, LoginAttemptLog, OAuth2Provider,
    PasswordHasher, RateLimiter, RefreshTokenStore, TokenStore, TwoFactorStore,
};

/// Type-level bundle of provider implementations.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone)]
/// struct Production;
///
/// impl AuthProviders for Production {
///     type Accounts = PostgresAccountRepository;
///     type RateLimiter = RedisRateLimiter;
///     // ...
/// }
/// ```
pub trait AuthProviders: Clone + Send + Sync + 'static {
    /// Account and external identity storage.
    type Accounts: AccountRepository + Clone + 'static;
    /// Password hashing.
    type Hasher: PasswordHasher + Clone + 'static;
    /// One-time tokens (password reset, email verification, `OAuth` state).
    type Tokens: TokenStore + Clone + 'static;
    /// Outbound email.
    type Email: EmailProvider + Clone + 'static;
    /// Refresh token records.
    type RefreshTokens: RefreshTokenStore + Clone + 'static;
    /// Admission control.
    type RateLimiter: RateLimiter + Clone + 'static;
    /// Two-factor credentials.
    type TwoFactor: TwoFactorStore + Clone + 'static;
    /// Device registry.
    type Devices: DeviceRepository + Clone + 'static;
    /// Login audit log.
    type Attempts: LoginAttemptLog + Clone + 'static;
    /// External identity providers.
    type OAuth: OAuth2Provider + Clone + 'static;
}

/// Authentication environment.
///
/// Contains all external dependencies needed by the auth services.
#[derive(Clone)]
pub struct AuthEnvironment<P: AuthProviders> {
    /// Account repository (`PostgreSQL` in production).
    pub accounts: P::Accounts,

    /// Password hasher.
    pub hasher: P::Hasher,

    /// One-time token store (`Redis` - atomic consumption).
    pub tokens: P::Tokens,

    /// Email provider.
    pub email: P::Email,

    /// Refresh token store.
    pub refresh_tokens: P::RefreshTokens,

    /// Rate limiter (`Redis` or in-process).
    pub rate_limiter: P::RateLimiter,

    /// Two-factor credential store.
    pub two_factor: P::TwoFactor,

    /// Device repository.
    pub devices: P::Devices,

    /// Login attempt log.
    pub attempts: P::Attempts,

    /// `OAuth2` providers.
    pub oauth: P::OAuth,
}

impl<P: AuthProviders> AuthEnvironment<P> {
    /// Create a new authentication environment.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        accounts: P::Accounts,
        hasher: P::Hasher,
        tokens: P::Tokens,
        email: P::Email,
        refresh_tokens: P::RefreshTokens,
        rate_limiter: P::RateLimiter,
        two_factor: P::TwoFactor,
        devices: P::Devices,
        attempts: P::Attempts,
        oauth: P::OAuth,
    ) -> Self {
        Self {
            accounts,
            hasher,
            tokens,
            email,
            refresh_tokens,
            rate_limiter,
            two_factor,
            devices,
            attempts,
            oauth,
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl AuthEnvironment<crate::mocks::InMemoryProviders> {
    /// Environment backed entirely by in-memory providers.
    #[must_use]
    pub fn in_memory() -> Self {
        use crate::mocks::{
            MockAccountRepository, MockDeviceRepository, MockEmailProvider, MockLoginAttemptLog,
            MockOAuth2Provider, MockPasswordHasher, MockRefreshTokenStore, MockTokenStore,
            MockTwoFactorStore,
        };

        Self::new(
            MockAccountRepository::new(),
            MockPasswordHasher::new(),
            MockTokenStore::new(),
            MockEmailProvider::new(),
            MockRefreshTokenStore::new(),
            crate::rate_limit::SlidingWindowLimiter::new(),
            MockTwoFactorStore::new(),
            MockDeviceRepository::new(),
            MockLoginAttemptLog::new(),
            MockOAuth2Provider::new(),
        )
    }
}
