//! Retry classification and backoff for upstream requests.
//!
//! Transient failures (connection errors, 5xx, 408, 429) are retried up to
//! the configured `max_retries` with exponential backoff and jitter. Other
//! 4xx responses are never retried.

use std::time::Duration;

use rand::Rng;

/// Whether an HTTP status is worth retrying.
pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

/// Backoff delay before retry `attempt` (0-based): `base * 2^attempt`,
/// scaled by a jitter factor in `[0.5, 1.5)`.
pub fn backoff_delay(attempt: u32, base_seconds: f64) -> Duration {
    let exp = base_seconds * f64::from(1u32 << attempt.min(16));
    let jitter = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64((exp * jitter).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(408));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn backoff_grows_with_attempts() {
        // Jitter is bounded by [0.5, 1.5), so attempt 3 at base 1s is
        // always longer than attempt 0.
        let first = backoff_delay(0, 1.0);
        let later = backoff_delay(3, 1.0);
        assert!(later > first);
        assert!(first >= Duration::from_millis(500));
        assert!(first < Duration::from_millis(1500));
    }

    #[test]
    fn backoff_zero_base_is_zero() {
        assert_eq!(backoff_delay(5, 0.0), Duration::ZERO);
    }
}
