//! Storage backends.
//!
//! - **`Redis`**: sliding-window rate limiting and one-time tokens, both
//!   relying on key TTLs for expiry
//! - **`PostgreSQL`** (feature `postgres`): accounts, links, refresh tokens,
//!   two-factor credentials, devices and the login audit log

#[cfg(feature = "postgres")]
pub mod postgres;
pub mod rate_limiter_redis;
pub mod token_redis;

#[cfg(feature = "postgres")]
pub use postgres::{
    PostgresAccountRepository, PostgresDeviceRepository, PostgresLoginAttemptLog,
    PostgresRefreshTokenStore, PostgresTwoFactorStore,
};
pub use rate_limiter_redis::RedisRateLimiter;
pub use token_redis::RedisTokenStore;
