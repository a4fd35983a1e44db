//! Exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

/// Delay to wait after the failed attempt with 0-based index `attempt`.
///
/// `base * 2^attempt`, capped at `max`, plus up to `jitter_ratio` of the
/// capped delay chosen at random.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration, jitter_ratio: f64) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    let capped = base.saturating_mul(factor).min(max);

    if jitter_ratio <= 0.0 {
        return capped;
    }
    let jitter_range = capped.mul_f64(jitter_ratio.min(1.0));
    if jitter_range.is_zero() {
        return capped;
    }
    let jitter = rand::thread_rng().gen_range(Duration::ZERO..jitter_range);
    capped + jitter
}
