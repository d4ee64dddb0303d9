//! Redis-based sliding window rate limiter.
//!
//! # Algorithm
//!
//! Each key is a sorted set of admission timestamps (milliseconds). One Lua
//! script, executed atomically by Redis:
//!
//! 1. Removes entries at or before `now - window` (`ZREMRANGEBYSCORE`)
//! 2. Counts the rest (`ZCARD`)
//! 3. Below the limit: records `now` (`ZADD`) and refreshes the key TTL
//! 4. At the limit: reports when the oldest entry leaves the window
//!
//! Denied requests are not recorded. The key TTL equals the window, so idle
//! keys disappear without a sweep.

use crate::error::{AuthError, Result};
use crate::providers::{RateLimitDecision, RateLimiter};
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const ADMIT_SCRIPT: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local max = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count < max then
  redis.call('ZADD', key, now, ARGV[4])
  redis.call('PEXPIRE', key, window)
  return {1, max - count - 1}
end
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
return {0, tonumber(oldest[2]) + window - now}
";

/// `Redis`-based rate limiter.
///
/// # Example
///
/// ```no_run
/// use sentinel_auth::stores::RedisRateLimiter;
/// use sentinel_auth::providers::RateLimiter;
///
/// # async fn example() -> sentinel_auth::Result<()> {
/// let limiter = RedisRateLimiter::new("redis://127.0.0.1:6379").await?;
/// let decision = limiter
///     .admit("route_limit:10.0.0.1:/auth/login", 5, std::time::Duration::from_secs(60))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn_manager: ConnectionManager,
    script: Script,
}

impl RedisRateLimiter {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the URL is malformed or the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| AuthError::InternalError(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            AuthError::InternalError(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self {
            conn_manager,
            script: Script::new(ADMIT_SCRIPT),
        })
    }

    fn rate_limit_key(key: &str) -> String {
        format!("rate_limit:{key}")
    }

    #[allow(clippy::cast_possible_truncation)] // millisecond timestamps fit in u64
    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }
}

impl RateLimiter for RedisRateLimiter {
    async fn admit(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateLimitDecision> {
        let mut conn = self.conn_manager.clone();
        let now = Self::now_ms();
        #[allow(clippy::cast_possible_truncation)] // windows are minutes, not centuries
        let window_ms = window.as_millis() as u64;
        let member = format!("{now}-{}", uuid::Uuid::new_v4());

        let (allowed, value): (i64, i64) = self
            .script
            .key(Self::rate_limit_key(key))
            .arg(now)
            .arg(window_ms)
            .arg(max_requests)
            .arg(member)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, key = %key, "Rate limit script failed");
                AuthError::InternalError(format!("Rate limit check failed: {e}"))
            })?;

        if allowed == 1 {
            return Ok(RateLimitDecision::Allowed {
                remaining: u32::try_from(value).unwrap_or(0),
            });
        }

        let retry_after_ms = u64::try_from(value).unwrap_or(0);
        let retry_after_secs = retry_after_ms.div_ceil(1000).max(1);
        tracing::warn!(key = %key, retry_after_secs, "Rate limit exceeded");
        Ok(RateLimitDecision::Denied { retry_after_secs })
    }

    async fn sweep(&self, _idle: Duration) -> Result<usize> {
        // Key TTLs already expire idle keys.
        Ok(0)
    }
}
