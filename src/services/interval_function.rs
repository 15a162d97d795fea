//! Backoff policies. An `IntervalFunction` maps an attempt count to the
//! delay added to `now` to compute the next `run_at`. Plain `Fn` values
//! rather than a trait object: no configuration source needs dynamic
//! dispatch across interval functions.

use std::sync::Arc;
use std::time::Duration;

/// `attempts -> delay`, called only after an unsuccessful attempt. An
/// `Arc` rather than a `Box` since the engine shares one interval
/// function across every concurrently executing task.
pub type IntervalFunction = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Exponential backoff: `min(base * 2^(attempts - 1), cap)`. `attempts`
/// is clamped to `0` delay, matching "called only on failure" — an
/// `attempts` of `0` should not occur in practice but is handled safely.
#[must_use]
pub fn exponential_backoff(base: Duration, cap: Duration) -> IntervalFunction {
    Arc::new(move |attempts: u32| {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let exponent = attempts.saturating_sub(1).min(63);
        let multiplier = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let scaled = base.checked_mul(multiplier as u32).unwrap_or(cap);
        scaled.min(cap)
    })
}

/// A fixed delay regardless of attempt count.
#[must_use]
pub fn constant(delay: Duration) -> IntervalFunction {
    Arc::new(move |_attempts: u32| delay)
}
