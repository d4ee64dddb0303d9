//! In-memory provider implementations.
//!
//! Every provider trait has a `Mock*` implementation backed by
//! `Arc<Mutex<..>>` state. They honour the same atomicity contracts as the
//! production stores (each operation completes under one lock), which makes
//! them suitable for tests and single-process deployments.
//!
//! [`InMemoryProviders`] bundles them for [`crate::AuthEnvironment`].

use crate::error::{AuthError, Result};
use std::sync::{Mutex, MutexGuard};

pub mod account;
pub mod device;
pub mod email;
pub mod oauth;
pub mod password;
pub mod refresh_token;
pub mod token_store;
pub mod two_factor;

pub use account::MockAccountRepository;
pub use device::{MockDeviceRepository, MockLoginAttemptLog};
pub use email::{EmailKind, MockEmailProvider, SentEmail};
pub use oauth::MockOAuth2Provider;
pub use password::MockPasswordHasher;
pub use refresh_token::MockRefreshTokenStore;
pub use token_store::MockTokenStore;
pub use two_factor::MockTwoFactorStore;

use crate::environment::AuthProviders;
use crate::rate_limit::SlidingWindowLimiter;

/// Provider bundle made of in-memory implementations.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryProviders;

impl AuthProviders for InMemoryProviders {
    type Accounts = MockAccountRepository;
    type Hasher = MockPasswordHasher;
    type Tokens = MockTokenStore;
    type Email = MockEmailProvider;
    type RefreshTokens = MockRefreshTokenStore;
    type RateLimiter = SlidingWindowLimiter;
    type TwoFactor = MockTwoFactorStore;
    type Devices = MockDeviceRepository;
    type Attempts = MockLoginAttemptLog;
    type OAuth = MockOAuth2Provider;
}

/// Lock a mutex, mapping poisoning to `InternalError`.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))
}
