//! Concurrency slots and request rate limiting for remote storage operations
//!
//! This crate provides the two admission mechanisms used by `s3cp`:
//!
//! 1. **Concurrency Limit** - A fixed pool of slots bounding the number of simultaneously
//!    in-flight remote operations
//! 2. **Operations Throttle** - Limits the number of remote requests issued per second
//!
//! # Concurrency Limit
//!
//! A [`ConcurrencyLimit`] hands out [`Slot`]s. A slot is returned to the pool when it is dropped,
//! so holding it for the lifetime of a task guarantees release on every exit path:
//!
//! ```rust,no_run
//! use throttle::ConcurrencyLimit;
//! use std::num::NonZeroUsize;
//!
//! # async fn example() {
//! let limit = ConcurrencyLimit::new(NonZeroUsize::new(10).unwrap());
//! let slot = limit.acquire().await;
//! tokio::spawn(async move {
//!     let _slot = slot;
//!     // issue the remote call here - the slot is released when the task ends
//! });
//! # }
//! ```
//!
//! # Operations Throttling
//!
//! Limits remote requests per second to stay under service request-rate limits:
//!
//! ```rust,no_run
//! use throttle::{init_ops_tokens, run_ops_replenish_thread, get_ops_token};
//! use std::time::Duration;
//!
//! # async fn example() {
//! // 10 tokens every 100ms = 100 requests/sec
//! init_ops_tokens(10);
//! tokio::spawn(run_ops_replenish_thread(10, Duration::from_millis(100)));
//!
//! // acquire a token before each request
//! get_ops_token().await;
//! # }
//! ```
//!
//! Tokens are replenished by a background task that tops the bucket up to `replenish` tokens every
//! interval. When the throttle was never initialized (or initialized with 0) acquiring a token
//! returns immediately.

mod concurrency;
mod semaphore;

pub use concurrency::{ConcurrencyLimit, Slot};

static OPS_THROTTLE: semaphore::TokenBucket = semaphore::TokenBucket::new();

pub fn init_ops_tokens(ops_tokens: usize) {
    OPS_THROTTLE.setup(ops_tokens);
}

#[must_use]
pub fn ops_throttle_enabled() -> bool {
    OPS_THROTTLE.is_enabled()
}

pub async fn get_ops_token() {
    OPS_THROTTLE.consume().await;
}

pub async fn run_ops_replenish_thread(replenish: usize, interval: std::time::Duration) {
    OPS_THROTTLE.run_replenish_thread(replenish, interval).await;
}

/// Splits a per-second rate into a (tokens, interval) replenish schedule.
///
/// Rates divisible by 10 are refilled every 100ms to smooth out bursts; other rates are refilled
/// once per second.
#[must_use]
pub fn replenish_schedule(ops_per_second: usize) -> (usize, std::time::Duration) {
    if ops_per_second >= 10 && ops_per_second % 10 == 0 {
        (ops_per_second / 10, std::time::Duration::from_millis(100))
    } else {
        (ops_per_second, std::time::Duration::from_secs(1))
    }
}
