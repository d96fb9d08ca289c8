//! Work queue for Ingress keys
//!
//! - `WorkQueue`: deduplicating queue with at most one in-flight attempt per key
//! - `rate_limiter`: per-key exponential backoff and a shared token bucket

pub mod rate_limiter;
pub mod work_queue;

pub use rate_limiter::{
    default_controller_rate_limiter, BucketRateLimiter, ItemExponentialBackoff, MaxOfRateLimiter,
    RateLimiter, TokenBucket,
};
pub use work_queue::WorkQueue;
