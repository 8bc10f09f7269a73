use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Byte cap applied to each tool's output. Output beyond the cap is
    /// dropped, marked in-band, and counted in `bytes_truncated`.
    #[serde(default = "d_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Hard timeout for `bash` child processes, in seconds (further bounded
    /// by the session deadline).
    #[serde(default = "d_bash_timeout")]
    pub bash_timeout_seconds: u64,
    /// Upper bound on a `TOOL_INTENT:` line held by the streaming lookahead.
    #[serde(default = "d_max_intent_line_bytes")]
    pub max_intent_line_bytes: usize,
    /// Byte cap on the summary a `task` child returns to its parent.
    #[serde(default = "d_task_summary_bytes")]
    pub task_summary_bytes: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: d_max_output_bytes(),
            bash_timeout_seconds: d_bash_timeout(),
            max_intent_line_bytes: d_max_intent_line_bytes(),
            task_summary_bytes: d_task_summary_bytes(),
        }
    }
}

fn d_max_output_bytes() -> usize {
    65_536
}
fn d_bash_timeout() -> u64 {
    120
}
fn d_max_intent_line_bytes() -> usize {
    4_096
}
fn d_task_summary_bytes() -> usize {
    2_048
}
