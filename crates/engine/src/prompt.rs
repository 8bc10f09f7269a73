//! The generator output contract.
//!
//! The generator emits user-facing text only. When it needs a tool it ends
//! its output with exactly one `TOOL_INTENT:` line carrying a plain-English
//! description. It is never given tool JSON authorship; the compiler owns
//! that.

use regex::Regex;
use std::sync::OnceLock;

use rants_tools::ToolRegistry;

/// Marker that introduces a tool intent line.
pub const TOOL_INTENT_PREFIX: &str = "TOOL_INTENT:";

fn intent_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^TOOL_INTENT:[ \t]*(.+)$").expect("static regex"))
}

/// Build the generator system prompt: operator instructions (if any), the
/// output contract, and the appended `available_tools:` / `tool_choice:`
/// hints.
pub fn build_system_prompt(
    system: Option<&str>,
    registry: &ToolRegistry,
    tool_choice: Option<&str>,
) -> String {
    let mut prompt = String::new();

    if let Some(system) = system {
        if !system.trim().is_empty() {
            prompt.push_str(system.trim_end());
            prompt.push_str("\n\n");
        }
    }

    prompt.push_str(
        "You are the generator of a tool-using assistant.\n\
         Rules:\n\
         1. Write user-facing text only.\n\
         2. When a tool is needed, end your output with exactly one line:\n\
         TOOL_INTENT: <plain-English description of what the tool should do>\n\
         3. Never write tool JSON, schemas, parameter names, or reasoning blocks.\n\
         4. When no tool is needed, just answer and stop.\n\n",
    );

    prompt.push_str("available_tools:\n");
    prompt.push_str(&registry.listing());
    prompt.push('\n');
    prompt.push_str(&format!("tool_choice: {}\n", tool_choice.unwrap_or("auto")));

    prompt
}

/// Split generator output into `(user_visible_text, tool_intent)`.
///
/// The split is on the *last* line matching `^TOOL_INTENT:\s*(.+)$`. Text
/// before that line is the user-visible output; earlier intent lines are
/// stripped from it. No matching line means no intent and the loop
/// terminates.
pub fn parse_generator_output(raw: &str) -> (String, Option<String>) {
    let re = intent_line_re();
    let last = match re.captures_iter(raw).last() {
        Some(cap) => cap,
        None => return (raw.to_string(), None),
    };

    let full = last.get(0).expect("capture 0 always present");
    let intent = last
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let before = &raw[..full.start()];
    // Earlier intent lines are literal noise: drop each together with its
    // newline so surrounding text joins cleanly.
    static STRIP: OnceLock<Regex> = OnceLock::new();
    let strip = STRIP.get_or_init(|| Regex::new(r"(?m)^TOOL_INTENT:[^\n]*\n?").expect("static regex"));
    let visible = strip.replace_all(before, "").into_owned();

    (visible, Some(intent))
}
