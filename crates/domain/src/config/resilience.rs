use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Upstream retry policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Per-request timeout against upstream backends, in seconds.
    #[serde(default = "d_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Retries on transient failures (connect errors, 5xx, 408, 429).
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    /// Exponential backoff base, in seconds. Jitter is applied on top.
    #[serde(default = "d_backoff")]
    pub backoff_seconds: f64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: d_request_timeout(),
            max_retries: d_max_retries(),
            backoff_seconds: d_backoff(),
        }
    }
}

fn d_request_timeout() -> u64 {
    120
}
fn d_max_retries() -> u32 {
    2
}
fn d_backoff() -> f64 {
    0.5
}
