//! # Sentinel Authentication
//!
//! Credential, session and second-factor authentication for a web API.
//!
//! ## Features
//!
//! - **Password accounts**: registration, Argon2id verification, profile and
//!   password changes, reset and email verification by one-time link
//! - **Sessions**: short-lived HS256 access tokens plus rotating, revocable
//!   refresh tokens
//! - **Two-factor**: TOTP with encrypted secrets and single-use backup codes
//! - **External identities**: Google and GitHub sign-in with account linking
//! - **Devices**: fingerprinted device registry and a login audit trail
//! - **Rate limiting**: per client and route sliding windows
//!
//! ## Architecture
//!
//! Services are generic over provider traits ([`providers`]). An
//! [`AuthEnvironment`] bundles one implementation of each, and the
//! [`LoginOrchestrator`] composes the services into the public flows:
//!
//! ```text
//! request → rate limit → credentials / 2FA / OAuth → devices + audit → tokens
//! ```
//!
//! ## Example
//!
//! ```rust
//! use sentinel_auth::{
//!     AuthConfig, AuthEnvironment, LoginOrchestrator, LoginOutcome, RequestContext,
//! };
//! use sentinel_auth::providers::NewAccount;
//!
//! # async fn example() -> sentinel_auth::Result<()> {
//! let config = AuthConfig::new("secret", "Sentinel");
//! let auth = LoginOrchestrator::new(AuthEnvironment::in_memory(), config);
//! let ctx = RequestContext::new(std::net::Ipv4Addr::LOCALHOST.into(), "curl/8.0");
//!
//! auth.register(
//!     NewAccount {
//!         email: "ada@example.com".into(),
//!         username: "ada".into(),
//!         password: "correct horse battery".into(),
//!         full_name: None,
//!         phone: None,
//!     },
//!     &ctx,
//! )
//! .await?;
//!
//! match auth.login("ada@example.com", "correct horse battery", &ctx).await? {
//!     LoginOutcome::Authenticated(tokens) => assert_eq!(tokens.token_type, "bearer"),
//!     LoginOutcome::TwoFactorPending(_) => unreachable!(),
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod config;
pub mod constants;
pub mod credentials;
pub mod crypto;
pub mod devices;
pub mod environment;
pub mod error;
pub mod housekeeping;
pub mod login;
pub mod oauth;
pub mod providers;
pub mod rate_limit;
pub mod refresh;
pub mod state;
pub mod stores;
pub mod token;
pub mod two_factor;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use config::AuthConfig;
pub use environment::{AuthEnvironment, AuthProviders};
pub use error::{AuthError, Result};
pub use housekeeping::{Housekeeper, HousekeepingHandle, SweepReport};
pub use login::LoginOrchestrator;
pub use state::{
    AccountId, DeviceId, LoginOutcome, OAuthProvider, PendingTwoFactor, RequestContext, TokenPair,
};
pub use token::{Capability, TokenIssuer, TokenScope};
