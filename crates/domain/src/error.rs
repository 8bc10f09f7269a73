use serde::{Deserialize, Serialize};

/// Shared error type used across all RANTS crates.
///
/// Variants map onto the gateway's client-visible error taxonomy; the HTTP
/// layer owns the status-code mapping.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage: {0}")]
    Storage(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited")]
    RateLimited { retry_after_secs: u64 },

    /// Upstream backend failure after retry exhaustion (or a non-retryable
    /// status). Carries the last HTTP status and a body excerpt.
    #[error("upstream error (status {status:?}): {message}")]
    Upstream { status: Option<u16>, message: String },

    /// Tool compiler could not produce a valid `tool_calls` array after the
    /// repair attempt. Details are audited, never shown to clients.
    #[error("tool compile: {0}")]
    ToolCompile(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("recursion limit reached")]
    RecursionLimit,

    #[error("cancelled")]
    Cancelled,

    /// Step index gap or duplicate detected by the store (single-writer
    /// enforcement).
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("config: {0}")]
    Config(String),

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds that travel *inside* a tool result.
///
/// Tool-level failures are never fatal to a session — they become results the
/// next generation observes — so they are a separate serializable enum rather
/// than transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    SandboxViolation,
    ToolExec,
    InvalidParams,
    RecursionLimit,
    DeadlineExceeded,
    Cancelled,
}

impl ToolErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolErrorKind::SandboxViolation => "sandbox_violation",
            ToolErrorKind::ToolExec => "tool_exec",
            ToolErrorKind::InvalidParams => "invalid_params",
            ToolErrorKind::RecursionLimit => "recursion_limit",
            ToolErrorKind::DeadlineExceeded => "deadline_exceeded",
            ToolErrorKind::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sandbox_violation" => Some(ToolErrorKind::SandboxViolation),
            "tool_exec" => Some(ToolErrorKind::ToolExec),
            "invalid_params" => Some(ToolErrorKind::InvalidParams),
            "recursion_limit" => Some(ToolErrorKind::RecursionLimit),
            "deadline_exceeded" => Some(ToolErrorKind::DeadlineExceeded),
            "cancelled" => Some(ToolErrorKind::Cancelled),
            _ => None,
        }
    }
}
