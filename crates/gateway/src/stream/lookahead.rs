//! Intent-line suppression for streamed text.
//!
//! Text deltas are forwarded as produced, with two carve-outs that keep the
//! stream byte-consistent with the parsed transcript:
//!
//! - no `TOOL_INTENT:` line is ever emitted (the last one is the intent,
//!   earlier ones are stripped as noise);
//! - text after the last intent line of a generation is not user-visible,
//!   so once an intent line completes, later bytes are deferred — they
//!   flush only if a newer intent line proves them to be "before the last
//!   intent", and are dropped when the generation ends.
//!
//! Held ambiguity is at most `len("TOOL_INTENT:")` bytes; a confirmed
//! intent line is discarded as it arrives. The deferred buffer holds at
//! most one generation's post-intent text, which the backend's token limit
//! already bounds.

const MARKER: &str = "TOOL_INTENT:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// At (or near) line start; the held bytes may still be a marker prefix.
    Hold,
    /// Current line is confirmed ordinary text; pass through until newline.
    Safe,
    /// Current line is a confirmed intent line; drop until newline.
    Suppress,
}

pub struct IntentGuard {
    mode: Mode,
    held: String,
    /// True once an intent line has completed in the current generation;
    /// emissions then accumulate in `pending` instead of going out.
    deferred: bool,
    pending: String,
}

impl IntentGuard {
    pub fn new() -> Self {
        Self {
            mode: Mode::Hold,
            held: String::new(),
            deferred: false,
            pending: String::new(),
        }
    }

    fn emit(&mut self, out: &mut String, text: &str) {
        if self.deferred {
            self.pending.push_str(text);
        } else {
            out.push_str(text);
        }
    }

    /// Feed a delta; returns the bytes safe to emit now.
    pub fn push(&mut self, chunk: &str) -> String {
        let mut out = String::new();
        for ch in chunk.chars() {
            match self.mode {
                Mode::Safe => {
                    self.emit(&mut out, ch.encode_utf8(&mut [0u8; 4]));
                    if ch == '\n' {
                        self.mode = Mode::Hold;
                    }
                }
                Mode::Suppress => {
                    if ch == '\n' {
                        // An intent line just completed; everything that
                        // follows is only visible if a later intent line
                        // supersedes it.
                        self.deferred = true;
                        self.mode = Mode::Hold;
                    }
                }
                Mode::Hold => {
                    if ch == '\n' {
                        if self.held == MARKER {
                            // A bare marker line is still never shown.
                            self.held.clear();
                        } else {
                            let line = std::mem::take(&mut self.held);
                            self.emit(&mut out, &line);
                            self.emit(&mut out, "\n");
                        }
                        continue;
                    }
                    self.held.push(ch);
                    if self.held.len() > MARKER.len() {
                        if self.held.starts_with(MARKER) {
                            // Confirmed intent line: the deferred text
                            // preceding it is visible after all.
                            let visible = std::mem::take(&mut self.pending);
                            out.push_str(&visible);
                            self.held.clear();
                            self.mode = Mode::Suppress;
                        } else {
                            let line = std::mem::take(&mut self.held);
                            self.emit(&mut out, &line);
                            self.mode = Mode::Safe;
                        }
                    } else if !MARKER.starts_with(self.held.as_str()) {
                        let line = std::mem::take(&mut self.held);
                        self.emit(&mut out, &line);
                        self.mode = Mode::Safe;
                    }
                }
            }
        }
        out
    }

    /// End of one generation: flush held bytes that turned out to be
    /// ordinary text, drop anything that trailed the last intent line, and
    /// reset for the next generation.
    pub fn finish(&mut self) -> String {
        let out = if !self.deferred && self.mode == Mode::Hold && self.held != MARKER {
            std::mem::take(&mut self.held)
        } else {
            String::new()
        };
        self.held.clear();
        self.pending.clear();
        self.deferred = false;
        self.mode = Mode::Hold;
        out
    }
}

impl Default for IntentGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed the input in chunks of `n` bytes and collect the output.
    fn run_chunked(input: &str, n: usize) -> String {
        let mut guard = IntentGuard::new();
        let mut out = String::new();
        let mut rest = input;
        while !rest.is_empty() {
            let mut end = n.min(rest.len());
            while end < rest.len() && !rest.is_char_boundary(end) {
                end += 1;
            }
            out.push_str(&guard.push(&rest[..end]));
            rest = &rest[end..];
        }
        out.push_str(&guard.finish());
        out
    }

    #[test]
    fn ordinary_text_passes_through() {
        for n in [1, 3, 8, 64] {
            assert_eq!(run_chunked("Hello world.", n), "Hello world.");
        }
    }

    #[test]
    fn intent_line_is_never_emitted() {
        let input = "Updating README.\nTOOL_INTENT: edit README.md to fix the mermaid block";
        for n in [1, 2, 5, 8, 64] {
            let out = run_chunked(input, n);
            assert_eq!(out, "Updating README.\n");
            assert!(!out.contains("TOOL_INTENT:"));
        }
    }

    #[test]
    fn every_intent_line_is_suppressed() {
        let input = "a\nTOOL_INTENT: first\nb\nTOOL_INTENT: second\n";
        for n in [1, 4, 16] {
            assert_eq!(run_chunked(input, n), "a\nb\n");
        }
    }

    #[test]
    fn text_between_intents_is_kept() {
        // "between" precedes the last intent line, so it is user-visible.
        let input = "TOOL_INTENT: first\nbetween\nTOOL_INTENT: second";
        assert_eq!(run_chunked(input, 3), "between\n");
    }

    #[test]
    fn trailing_text_after_last_intent_is_dropped() {
        // Matches the transcript parse: text before the last intent line is
        // the user-visible output.
        let input = "before\nTOOL_INTENT: do it\nafter\n";
        for n in [1, 7, 64] {
            assert_eq!(run_chunked(input, n), "before\n");
        }
    }

    #[test]
    fn marker_mid_line_is_ordinary_text() {
        let input = "see TOOL_INTENT: in docs\n";
        assert_eq!(run_chunked(input, 3), input);
    }

    #[test]
    fn bare_marker_line_is_suppressed() {
        assert_eq!(run_chunked("x\nTOOL_INTENT:\ny\n", 2), "x\ny\n");
        // Also when the stream ends right after the bare marker.
        assert_eq!(run_chunked("x\nTOOL_INTENT:", 5), "x\n");
    }

    #[test]
    fn incomplete_prefix_flushes_at_finish() {
        // Stream ends mid-way through what could have become a marker.
        assert_eq!(run_chunked("TOOL_IN", 2), "TOOL_IN");
    }

    #[test]
    fn long_intent_lines_stay_suppressed() {
        let input = format!("ok\nTOOL_INTENT: {}\n", "x".repeat(100_000));
        assert_eq!(run_chunked(&input, 4096), "ok\n");
    }

    #[test]
    fn finish_resets_for_the_next_generation() {
        let mut guard = IntentGuard::new();
        assert_eq!(guard.push("TOOL_INTENT: do it\nleftover"), "");
        assert_eq!(guard.finish(), "");
        // A fresh generation streams normally.
        assert_eq!(guard.push("second answer\n"), "second answer\n");
        assert_eq!(guard.finish(), "");
    }

    #[test]
    fn multibyte_text_near_marker_length_is_not_mangled() {
        let input = "TOOL_INTENTé no colon\n";
        assert_eq!(run_chunked(input, 1), input);
    }
}
