use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rate limiting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-tenant token bucket: `requests_per_minute` refill, `burst` capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_rpm")]
    pub requests_per_minute: u32,
    #[serde(default = "d_burst")]
    pub burst: u32,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_minute: d_rpm(),
            burst: d_burst(),
        }
    }
}

fn d_rpm() -> u32 {
    60
}
fn d_burst() -> u32 {
    10
}
