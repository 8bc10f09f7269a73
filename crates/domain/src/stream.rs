use serde::{Deserialize, Serialize};
use std::pin::Pin;
use uuid::Uuid;

use crate::response::ResponseObject;

/// A boxed async stream, used for backend token streaming.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted while streaming generator output from a backend.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text token chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },
}

/// Token usage for a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The internal event stream rendered by the streaming assembler.
///
/// Tool-phase events exist for loop observability only — they are never
/// forwarded to clients on either output dialect.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    SessionStarted { session_id: Uuid },
    /// Raw generator text as produced. The assembler is responsible for
    /// suppressing tool-intent lines before anything reaches a client.
    TextDelta { text: String },
    TextDone,
    ToolPhaseStarted { step_index: u32 },
    ToolPhaseDone { step_index: u32 },
    Completed { response: ResponseObject },
    Failed { error: EngineError },
}

/// Cloneable terminal error carried on the event stream.
#[derive(Debug, Clone, Serialize)]
pub struct EngineError {
    /// Stable kind tag (e.g. `upstream_error`, `deadline_exceeded`).
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl EngineError {
    pub fn from_error(err: &crate::error::Error) -> Self {
        use crate::error::Error;
        match err {
            Error::Upstream { status, message } => Self {
                kind: "upstream_error".into(),
                message: match status {
                    Some(status) => format!("upstream returned status {status}: {message}"),
                    None => format!("upstream request failed: {message}"),
                },
                status: *status,
            },
            Error::ToolCompile(_) => Self {
                // Details are audited only; clients get a generic message.
                kind: "tool_compile_error".into(),
                message: "tool compilation failed".into(),
                status: None,
            },
            Error::DeadlineExceeded => Self {
                kind: "deadline_exceeded".into(),
                message: "session wallclock budget exceeded".into(),
                status: None,
            },
            Error::Cancelled => Self {
                kind: "cancelled".into(),
                message: "session cancelled".into(),
                status: None,
            },
            Error::ConcurrentModification(m) => Self {
                kind: "concurrent_modification".into(),
                message: m.clone(),
                status: None,
            },
            other => Self {
                kind: "internal_error".into(),
                message: other.to_string(),
                status: None,
            },
        }
    }
}
