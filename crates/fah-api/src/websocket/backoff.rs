// Reconnection backoff policy.

use std::time::Duration;

/// Base delay doubled on every attempt.
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on the backoff delay. Reached at attempt 5
/// (`1s * 2^5 = 32s > 30s`).
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponential backoff: `delay(attempt) = min(1s * 2^attempt, 30s)`.
///
/// Pure and total for any attempt count, monotonically non-decreasing,
/// and deterministic -- the supervisor's retry schedule is exact.
pub fn backoff_delay(attempt: u32) -> Duration {
    let doubled = BASE_DELAY.saturating_mul(2u32.saturating_pow(attempt));
    doubled.min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_the_cap() {
        let expected_secs = [1, 2, 4, 8, 16, 30, 30, 30, 30, 30, 30];
        for (attempt, secs) in expected_secs.into_iter().enumerate() {
            assert_eq!(
                backoff_delay(u32::try_from(attempt).expect("small")),
                Duration::from_secs(secs),
                "attempt {attempt}"
            );
        }
    }

    #[test]
    fn strictly_increasing_below_the_cap() {
        for attempt in 0..4 {
            assert!(backoff_delay(attempt) < backoff_delay(attempt + 1));
        }
    }

    #[test]
    fn large_attempt_counts_stay_capped() {
        assert_eq!(backoff_delay(63), Duration::from_secs(30));
        assert_eq!(backoff_delay(u32::MAX), Duration::from_secs(30));
    }
}
