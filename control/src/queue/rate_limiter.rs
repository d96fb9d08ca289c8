//! Requeue Rate Limiters
//!
//! Decide how long a failed key waits before it is processed again:
//! - `ItemExponentialBackoff`: per-key delay doubling on every failure, capped
//! - `BucketRateLimiter`: token bucket shared by all keys (overall requeue rate)
//! - `MaxOfRateLimiter`: the longest delay of several limiters
//!
//! Algorithm: https://en.wikipedia.org/wiki/Token_bucket
//!
//! Example:
//! ```rust,ignore
//! let limiter = default_controller_rate_limiter(
//!     Duration::from_millis(5),
//!     Duration::from_secs(1000),
//!     10.0,
//!     100,
//! );
//! let delay = limiter.when(&"shop/web".to_string());
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Mutex lock helper that recovers from poisoning
#[inline]
fn safe_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!("Mutex poisoned, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

/// Requeue delay policy
pub trait RateLimiter<K>: Send + Sync {
    /// Delay before `item` may be processed again; records a failure
    fn when(&self, item: &K) -> Duration;

    /// Clear the failure history of `item`
    fn forget(&self, item: &K);

    /// Failures recorded for `item` since it was last forgotten
    fn num_requeues(&self, item: &K) -> u32;
}

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`
pub struct ItemExponentialBackoff<K> {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<K, u32>>,
}

impl<K: Eq + Hash + Clone> ItemExponentialBackoff<K> {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn backoff(&self, exp: u32) -> Duration {
        2u32.checked_pow(exp)
            .and_then(|factor| self.base.checked_mul(factor))
            .map(|delay| delay.min(self.max))
            .unwrap_or(self.max)
    }
}

impl<K: Eq + Hash + Clone + Send> RateLimiter<K> for ItemExponentialBackoff<K> {
    fn when(&self, item: &K) -> Duration {
        let mut failures = safe_lock(&self.failures);
        let exp = failures.entry(item.clone()).or_insert(0);
        let delay = self.backoff(*exp);
        *exp = exp.saturating_add(1);
        delay
    }

    fn forget(&self, item: &K) {
        safe_lock(&self.failures).remove(item);
    }

    fn num_requeues(&self, item: &K) -> u32 {
        safe_lock(&self.failures).get(item).copied().unwrap_or(0)
    }
}

/// Token bucket
///
/// Unlike a request limiter it never rejects: `reserve` always takes a token
/// and reports how long the caller must wait for it to exist.
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum tokens (burst capacity)
    capacity: f64,
    /// Refill rate (tokens per second)
    refill_rate: f64,
    /// Current tokens (negative while reservations are outstanding) and last refill
    state: Mutex<(f64, Instant)>,
}

impl TokenBucket {
    /// Create a new token bucket
    ///
    /// # Arguments
    /// * `rate` - Tokens per second
    /// * `burst` - Maximum burst capacity (tokens)
    pub fn new(rate: f64, burst: u64) -> Self {
        let capacity = burst as f64;
        Self {
            capacity,
            refill_rate: rate,
            state: Mutex::new((capacity, Instant::now())), // Start with full bucket
        }
    }

    /// Take one token, returning the wait until it is available
    pub fn reserve(&self) -> Duration {
        if self.refill_rate <= 0.0 {
            return Duration::ZERO;
        }

        let mut state = safe_lock(&self.state);
        let now = Instant::now();
        let elapsed = now.duration_since(state.1);
        state.0 = (state.0 + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        state.1 = now;

        state.0 -= 1.0;
        if state.0 >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-state.0 / self.refill_rate)
        }
    }
}

/// Overall requeue rate shared by every key
pub struct BucketRateLimiter {
    bucket: TokenBucket,
}

impl BucketRateLimiter {
    pub fn new(rate: f64, burst: u64) -> Self {
        Self {
            bucket: TokenBucket::new(rate, burst),
        }
    }
}

impl<K> RateLimiter<K> for BucketRateLimiter {
    fn when(&self, _item: &K) -> Duration {
        self.bucket.reserve()
    }

    fn forget(&self, _item: &K) {}

    fn num_requeues(&self, _item: &K) -> u32 {
        0
    }
}

/// Longest delay of the wrapped limiters
pub struct MaxOfRateLimiter<K> {
    limiters: Vec<Box<dyn RateLimiter<K>>>,
}

impl<K> MaxOfRateLimiter<K> {
    pub fn new(limiters: Vec<Box<dyn RateLimiter<K>>>) -> Self {
        Self { limiters }
    }
}

impl<K> RateLimiter<K> for MaxOfRateLimiter<K> {
    fn when(&self, item: &K) -> Duration {
        self.limiters
            .iter()
            .map(|l| l.when(item))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&self, item: &K) {
        for limiter in &self.limiters {
            limiter.forget(item);
        }
    }

    fn num_requeues(&self, item: &K) -> u32 {
        self.limiters
            .iter()
            .map(|l| l.num_requeues(item))
            .max()
            .unwrap_or(0)
    }
}

/// Per-key exponential backoff combined with an overall token bucket
pub fn default_controller_rate_limiter<K>(
    base: Duration,
    max: Duration,
    rate: f64,
    burst: u64,
) -> MaxOfRateLimiter<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    MaxOfRateLimiter::new(vec![
        Box::new(ItemExponentialBackoff::new(base, max)),
        Box::new(BucketRateLimiter::new(rate, burst)),
    ])
}
