//! Exponential backoff with jitter.

use std::time::Duration;
use rand::Rng;

/// Delay before retrying after `attempt` consecutive failures.
///
/// Doubles from `base_ms` per attempt and never exceeds `max_ms`, jitter
/// included. Attempt zero means no failure yet and returns zero.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(max_ms);

    // Up to 10% extra, spreading retries from loops that failed together.
    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay.saturating_add(jitter).min(max_ms))
}
