use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use rants_domain::error::ToolErrorKind;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cancellation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A cancellation token checked at every suspension point.
///
/// Cloning shares state; cancelling a parent's token is observed by every
/// executor holding a clone.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Execution context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything an executor is allowed to see.
#[derive(Clone)]
pub struct ToolContext {
    /// Absolute sandbox root; no path may resolve outside it.
    pub workspace_root: PathBuf,
    /// Session deadline; executors must observe it at I/O boundaries.
    pub deadline: Instant,
    pub tenant_id: String,
    pub session_id: Uuid,
    /// Byte cap applied to tool output.
    pub max_output_bytes: usize,
    /// Hard timeout for subprocess tools, in seconds.
    pub bash_timeout_seconds: u64,
    pub cancel: CancelToken,
    /// Reentrant handle used by the `task` tool to run a child session.
    /// `None` outside a session loop (e.g. the chat shim's one-shot mode).
    pub reentry: Option<Arc<dyn Reentry>>,
}

/// The session loop's reentry point for the recursive `task` tool.
#[async_trait::async_trait]
pub trait Reentry: Send + Sync {
    /// Run `task` as a full child session and return its condensed result.
    async fn run_task(&self, task: String, ctx: &ToolContext) -> ToolOutcome;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What an executor hands back to the session loop. The loop pairs it with
/// the call id and timestamps to form the persisted tool result.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub ok: bool,
    pub output: String,
    pub error_kind: Option<ToolErrorKind>,
    pub bytes_truncated: u64,
}

impl ToolOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            ok: true,
            output: output.into(),
            error_kind: None,
            bytes_truncated: 0,
        }
    }

    pub fn failure(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            output: message.into(),
            error_kind: Some(kind),
            bytes_truncated: 0,
        }
    }

    /// Apply the context's output cap to this outcome.
    pub fn clamped(mut self, max_output_bytes: usize) -> Self {
        let (output, truncated) = crate::output::clamp_output(self.output, max_output_bytes);
        self.output = output;
        self.bytes_truncated += truncated;
        self
    }
}
