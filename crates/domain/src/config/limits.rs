use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Loop bounds
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum tool iterations per session before the loop force-terminates.
    #[serde(default = "d_max_tool_iterations")]
    pub max_tool_iterations: u32,
    /// Wallclock budget per root session, in seconds.
    #[serde(default = "d_max_wallclock_seconds")]
    pub max_wallclock_seconds: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: d_max_tool_iterations(),
            max_wallclock_seconds: d_max_wallclock_seconds(),
        }
    }
}

fn d_max_tool_iterations() -> u32 {
    8
}
fn d_max_wallclock_seconds() -> u64 {
    300
}
