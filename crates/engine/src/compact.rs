//! Compact context for the tool compiler.
//!
//! The compiler does not see the full transcript. It gets a summary tuned
//! for brevity: system and user input, then the most recent steps' generator
//! output and per-call result excerpts, oldest dropped first. The whole
//! shape stays behind the compiler input so it can change without touching
//! callers.

use rants_domain::session::CanonicalTranscript;

const SYSTEM_BUDGET: usize = 1024;
const USER_BUDGET: usize = 2048;
const EXCERPT_BUDGET: usize = 512;
const TOTAL_BUDGET: usize = 8192;
const RECENT_STEPS: usize = 4;

/// Truncate at a char boundary.
fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Build the compact context string for one compilation.
pub fn build_compact_context(transcript: &CanonicalTranscript) -> String {
    let mut out = String::new();

    if let Some(system) = &transcript.system {
        out.push_str("system: ");
        out.push_str(truncate_str(system, SYSTEM_BUDGET));
        out.push('\n');
    }
    out.push_str("user: ");
    out.push_str(truncate_str(&transcript.user.text, USER_BUDGET));
    out.push('\n');

    let start = transcript.steps.len().saturating_sub(RECENT_STEPS);
    for (offset, step) in transcript.steps[start..].iter().enumerate() {
        let index = start + offset;
        if !step.generator_output.is_empty() {
            out.push_str(&format!(
                "step {index} output: {}\n",
                truncate_str(&step.generator_output, EXCERPT_BUDGET)
            ));
        }
        for (call, result) in step.tool_calls.iter().zip(step.tool_results.iter()) {
            out.push_str(&format!(
                "step {index} {} ({}): {}\n",
                call.tool,
                if result.ok { "ok" } else { "error" },
                truncate_str(&result.output, EXCERPT_BUDGET)
            ));
        }
    }

    if out.len() > TOTAL_BUDGET {
        // Keep the tail: the most recent context matters most.
        let drop = out.len() - TOTAL_BUDGET;
        let mut start = drop;
        while start < out.len() && !out.is_char_boundary(start) {
            start += 1;
        }
        out = format!("…{}", &out[start..]);
    }

    out
}
