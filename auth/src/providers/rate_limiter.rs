//! Rate limiter trait.
//!
//! # Security
//!
//! Rate limiting is the first line of defence against brute force attacks on
//! credential and code endpoints. Keys are built from client address and
//! route, see [`RateLimitRule::key_for`](crate::config::RateLimitRule::key_for).

use crate::error::Result;
use std::time::Duration;

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Request admitted and recorded.
    Allowed {
        /// Requests still available in the current window.
        remaining: u32,
    },

    /// Request rejected. Nothing was recorded.
    Denied {
        /// Seconds until the oldest recorded request leaves the window.
        retry_after_secs: u64,
    },
}

impl RateLimitDecision {
    /// Whether the request was admitted.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Sliding-window rate limiter.
///
/// A request is admitted iff fewer than `max_requests` requests were admitted
/// for the same key during the trailing `window`. Check-and-record is a single
/// atomic step per key.
///
/// # Example
///
/// ```no_run
/// use sentinel_auth::providers::{RateLimitDecision, RateLimiter};
/// use std::time::Duration;
///
/// # async fn example(limiter: impl RateLimiter) -> Result<(), Box<dyn std::error::Error>> {
/// let key = "route_limit:203.0.113.7:/auth/login";
/// match limiter.admit(key, 5, Duration::from_secs(60)).await? {
///     RateLimitDecision::Allowed { remaining } => println!("{remaining} left"),
///     RateLimitDecision::Denied { retry_after_secs } => println!("retry in {retry_after_secs}s"),
/// }
/// # Ok(())
/// # }
/// ```
pub trait RateLimiter: Send + Sync {
    /// Check and record in one atomic operation.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store is unavailable.
    fn admit(
        &self,
        key: &str,
        max_requests: u32,
        window: Duration,
    ) -> impl std::future::Future<Output = Result<RateLimitDecision>> + Send;

    /// Drop state of keys that have seen no request for `idle`.
    ///
    /// # Returns
    ///
    /// Number of keys removed.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store is unavailable.
    fn sweep(&self, idle: Duration) -> impl std::future::Future<Output = Result<usize>> + Send;
}
