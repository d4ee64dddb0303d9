//! Sliding-window admission control.
//!
//! [`SlidingWindowLimiter`] is the single-node [`RateLimiter`]. Distributed
//! deployments use [`crate::stores::RedisRateLimiter`] instead; both are
//! driven through [`enforce`].
//!
//! # Algorithm
//!
//! Per key the limiter keeps the instants of admitted requests. On every
//! request it drops instants at or before `now - window`, admits the request
//! if fewer than `max_requests` remain, and records it. A denied request is
//! not recorded.

use crate::config::RateLimitRule;
use crate::error::{AuthError, Result};
use crate::providers::{RateLimitDecision, RateLimiter};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const SHARD_COUNT: usize = 16;

type Shard = Mutex<HashMap<String, VecDeque<Instant>>>;

/// Sharded in-memory sliding-window limiter.
///
/// Keys are spread over 16 independently locked shards. A sweep holds one
/// shard lock at a time, so admissions on other shards never wait for it.
/// Locks are never held across an `.await`.
///
/// Time comes from [`tokio::time::Instant`], so tests can drive windows with
/// `tokio::time::pause` and `advance`.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    shards: Arc<Vec<Shard>>,
}

impl SlidingWindowLimiter {
    /// Create an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: Arc::new((0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect()),
        }
    }

    fn shard(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        // Modulo keeps the value below SHARD_COUNT, so the cast is lossless.
        #[allow(clippy::cast_possible_truncation)]
        let index = (hasher.finish() % SHARD_COUNT as u64) as usize;
        &self.shards[index]
    }

    /// Number of keys currently tracked.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if a shard lock is poisoned.
    pub fn tracked_keys(&self) -> Result<usize> {
        let mut total = 0;
        for shard in self.shards.iter() {
            total += shard
                .lock()
                .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?
                .len();
        }
        Ok(total)
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole seconds until `oldest` leaves the window, rounded up, at least 1.
fn retry_after(oldest: Instant, window: Duration, now: Instant) -> u64 {
    let remaining = (oldest + window).saturating_duration_since(now);
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    secs.max(1)
}

impl RateLimiter for SlidingWindowLimiter {
    async fn admit(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> Result<RateLimitDecision> {
        let now = Instant::now();
        let mut shard = self
            .shard(key)
            .lock()
            .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?;

        let timestamps = shard.entry(key.to_string()).or_default();
        while timestamps
            .front()
            .is_some_and(|&ts| now.saturating_duration_since(ts) >= window)
        {
            timestamps.pop_front();
        }

        let used = u32::try_from(timestamps.len()).unwrap_or(u32::MAX);
        if used < max_requests {
            timestamps.push_back(now);
            let remaining = max_requests - used - 1;
            tracing::debug!(key = %key, remaining, "Rate limit admitted");
            return Ok(RateLimitDecision::Allowed { remaining });
        }

        let retry_after_secs = timestamps
            .front()
            .map_or(1, |&oldest| retry_after(oldest, window, now));

        tracing::warn!(
            key = %key,
            max_requests,
            retry_after_secs,
            "Rate limit exceeded"
        );

        Ok(RateLimitDecision::Denied { retry_after_secs })
    }

    async fn sweep(&self, idle: Duration) -> Result<usize> {
        let now = Instant::now();
        let mut removed = 0;

        for shard in self.shards.iter() {
            let mut shard = shard
                .lock()
                .map_err(|_| AuthError::InternalError("Mutex lock failed".into()))?;
            let before = shard.len();
            shard.retain(|_, timestamps| {
                timestamps
                    .back()
                    .is_some_and(|&newest| now.saturating_duration_since(newest) < idle)
            });
            removed += before - shard.len();
        }

        if removed > 0 {
            tracing::debug!(removed, "Swept idle rate limit keys");
        }

        Ok(removed)
    }
}

/// Admit one request from `client` under `rule`.
///
/// # Returns
///
/// Requests still available in the window.
///
/// # Errors
///
/// - `RateLimited` when the request is denied
/// - Any limiter backend error
pub async fn enforce<L: RateLimiter>(
    limiter: &L,
    rule: &RateLimitRule,
    client: &str,
) -> Result<u32> {
    enforce_key(limiter, &rule.key_for(client), rule).await
}

/// Admit one request counted under an explicit limiter `key` with the limits
/// of `rule`.
///
/// # Errors
///
/// Same as [`enforce`].
pub async fn enforce_key<L: RateLimiter>(
    limiter: &L,
    key: &str,
    rule: &RateLimitRule,
) -> Result<u32> {
    match limiter.admit(key, rule.max_requests, rule.window).await? {
        RateLimitDecision::Allowed { remaining } => Ok(remaining),
        RateLimitDecision::Denied { retry_after_secs } => Err(AuthError::RateLimited {
            retry_after_secs,
            limit: rule.max_requests,
            window_secs: rule.window.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sixth_request_denied_then_admitted_after_window() {
        let limiter = SlidingWindowLimiter::new();
        let window = Duration::from_secs(60);

        for expected_remaining in (0..5).rev() {
            let decision = limiter.admit("k", 5, window).await.unwrap();
            assert_eq!(decision, RateLimitDecision::Allowed { remaining: expected_remaining });
        }

        let denied = limiter.admit("k", 5, window).await.unwrap();
        assert_eq!(denied, RateLimitDecision::Denied { retry_after_secs: 60 });

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.admit("k", 5, window).await.unwrap().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_rounds_up() {
        let limiter = SlidingWindowLimiter::new();
        let window = Duration::from_secs(10);

        limiter.admit("k", 1, window).await.unwrap();
        tokio::time::advance(Duration::from_millis(9_500)).await;

        let denied = limiter.admit("k", 1, window).await.unwrap();
        assert_eq!(denied, RateLimitDecision::Denied { retry_after_secs: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides_per_request() {
        let limiter = SlidingWindowLimiter::new();
        let window = Duration::from_secs(60);

        limiter.admit("k", 2, window).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.admit("k", 2, window).await.unwrap();

        assert!(!limiter.admit("k", 2, window).await.unwrap().is_allowed());

        // Only the first request has left the window.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.admit("k", 2, window).await.unwrap().is_allowed());
        assert!(!limiter.admit("k", 2, window).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = SlidingWindowLimiter::new();
        let window = Duration::from_secs(60);

        assert!(limiter.admit("a", 1, window).await.unwrap().is_allowed());
        assert!(!limiter.admit("a", 1, window).await.unwrap().is_allowed());
        assert!(limiter.admit("b", 1, window).await.unwrap().is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_idle_keys_only() {
        let limiter = SlidingWindowLimiter::new();
        let window = Duration::from_secs(60);

        limiter.admit("old", 5, window).await.unwrap();
        tokio::time::advance(Duration::from_secs(3_000)).await;
        limiter.admit("fresh", 5, window).await.unwrap();
        tokio::time::advance(Duration::from_secs(700)).await;

        let removed = limiter.sweep(Duration::from_secs(3_600)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_keys().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_admissions_never_exceed_limit() {
        let limiter = SlidingWindowLimiter::new();
        let window = Duration::from_secs(60);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.admit("shared", 5, window).await.unwrap().is_allowed()
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    #[tokio::test]
    async fn test_enforce_maps_denial() {
        let limiter = SlidingWindowLimiter::new();
        let rule = RateLimitRule::new("/auth/login", 1, 60);

        assert_eq!(enforce(&limiter, &rule, "10.0.0.1").await.unwrap(), 0);
        let err = enforce(&limiter, &rule, "10.0.0.1").await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::RateLimited {
                limit: 1,
                window_secs: 60,
                retry_after_secs,
            } if retry_after_secs >= 1
        ));
    }
}
