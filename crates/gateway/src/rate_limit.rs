//! Per-tenant token buckets: `requests_per_minute` refill, `burst`
//! capacity. Denials surface as HTTP 429 with a `Retry-After` hint.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

use rants_domain::config::RateLimitsConfig;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    enabled: bool,
    refill_per_sec: f64,
    burst: f64,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn from_config(cfg: &RateLimitsConfig) -> Self {
        Self {
            enabled: cfg.enabled,
            refill_per_sec: f64::from(cfg.requests_per_minute) / 60.0,
            burst: f64::from(cfg.burst),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Take one token for `tenant`. On denial returns the suggested
    /// `Retry-After` in whole seconds (at least 1).
    pub fn try_acquire(&self, tenant: &str) -> Result<(), u64> {
        if !self.enabled {
            return Ok(());
        }

        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(tenant.to_string()).or_insert(Bucket {
            tokens: self.burst,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            let wait = (deficit / self.refill_per_sec).ceil().max(1.0);
            Err(wait as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rpm: u32, burst: u32) -> RateLimiter {
        RateLimiter::from_config(&RateLimitsConfig {
            enabled: true,
            requests_per_minute: rpm,
            burst,
        })
    }

    #[test]
    fn disabled_limiter_always_admits() {
        let l = RateLimiter::from_config(&RateLimitsConfig {
            enabled: false,
            requests_per_minute: 1,
            burst: 1,
        });
        for _ in 0..100 {
            assert!(l.try_acquire("t").is_ok());
        }
    }

    #[test]
    fn burst_is_honored_then_denied() {
        let l = limiter(60, 3);
        assert!(l.try_acquire("t").is_ok());
        assert!(l.try_acquire("t").is_ok());
        assert!(l.try_acquire("t").is_ok());
        let retry = l.try_acquire("t").unwrap_err();
        assert!(retry >= 1);
    }

    #[test]
    fn tenants_have_independent_buckets() {
        let l = limiter(60, 1);
        assert!(l.try_acquire("a").is_ok());
        assert!(l.try_acquire("a").is_err());
        assert!(l.try_acquire("b").is_ok());
    }

    #[test]
    fn slow_refill_suggests_longer_wait() {
        let l = limiter(6, 1); // one token every 10s
        assert!(l.try_acquire("t").is_ok());
        let retry = l.try_acquire("t").unwrap_err();
        assert!(retry >= 9, "retry hint was {retry}");
    }
}
