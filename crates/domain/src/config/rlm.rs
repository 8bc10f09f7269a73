use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Virtual model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RlmConfig {
    #[serde(default)]
    pub rants_one: VirtualModelConfig,
}

/// The single virtual model exposed to clients. All requests must name it;
/// internally the gateway fans out to the configured backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualModelConfig {
    #[serde(default = "d_name")]
    pub name: String,
    /// Iteration cap for this virtual model (also bounded by
    /// `limits.max_tool_iterations`; the smaller wins).
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
    /// Maximum recursion depth for `task` sub-sessions.
    #[serde(default = "d_max_depth")]
    pub max_depth: u32,
}

impl Default for VirtualModelConfig {
    fn default() -> Self {
        Self {
            name: d_name(),
            max_iterations: d_max_iterations(),
            max_depth: d_max_depth(),
        }
    }
}

fn d_name() -> String {
    "rants-one".into()
}
fn d_max_iterations() -> u32 {
    8
}
fn d_max_depth() -> u32 {
    3
}
