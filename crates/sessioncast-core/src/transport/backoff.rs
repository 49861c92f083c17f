use std::time::Duration;

use rand::Rng;

/// Exponential reconnect delay: `min(base * 2^(attempt - 1), cap)`.
/// `attempt` is 1-based.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let cap_ms = cap.as_millis() as u64;
    let exponent = attempt.saturating_sub(1).min(32);
    let delay_ms = base_ms.saturating_mul(1u64 << exponent).min(cap_ms);
    Duration::from_millis(delay_ms)
}

/// Additive jitter drawn uniformly from `[0, delay / 4]`, so concurrent
/// agents do not hammer the relay in lockstep.
pub fn with_jitter(delay: Duration) -> Duration {
    let delay_ms = delay.as_millis() as u64;
    if delay_ms < 4 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=delay_ms / 4);
    Duration::from_millis(delay_ms + jitter)
}
