//! Fetch retry backoff.
//!
//! Exponential delay `min(1000ms × 2^(attempt-1), 30s)` plus up to 10%
//! random jitter on top. Kept free of any timer so it can be tested
//! without waiting.

use std::time::Duration;

use rand::Rng;

/// Delay before the second attempt.
pub const BASE_DELAY: Duration = Duration::from_millis(1_000);

/// Upper bound on the exponential part.
pub const MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Jitter added on top, as a fraction of the exponential delay.
pub const JITTER_FRACTION: f64 = 0.10;

/// Exponential delay without jitter for 1-based `attempt`.
pub fn base_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let millis = BASE_DELAY.as_millis() as u64 * (1_u64 << exponent);
    Duration::from_millis(millis).min(MAX_DELAY)
}

/// Exponential delay plus jitter in `[0, 10%]`, drawn from `rng`.
pub fn delay_with_jitter<R: Rng + ?Sized>(attempt: u32, rng: &mut R) -> Duration {
    let base = base_delay(attempt);
    let jitter = base.mul_f64(rng.gen_range(0.0..=JITTER_FRACTION));
    base + jitter
}

/// Exponential delay plus jitter from the thread-local RNG.
pub fn delay(attempt: u32) -> Duration {
    delay_with_jitter(attempt, &mut rand::thread_rng())
}
