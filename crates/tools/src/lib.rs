//! Tool registry and executors.
//!
//! Each registered tool exposes `{name, description, schema, executor}`. The
//! registered set is fixed at startup and identical across sessions of the
//! same tenant; its canonical digest is recorded on every transcript.
//! Executors never raise uncaught errors — every failure maps to a
//! [`ToolOutcome`] with an error kind from the shared taxonomy.

mod bash;
mod builtin;
mod context;
mod file_ops;
mod output;
mod registry;
mod sandbox;

pub use bash::BashTool;
pub use builtin::builtin_registry;
pub use context::{CancelToken, Reentry, ToolContext, ToolOutcome};
pub use file_ops::{EditTool, ListTool, ReadTool, WriteTool};
pub use output::clamp_output;
pub use registry::{RegisteredTool, ToolExecutor, ToolRegistry};
pub use sandbox::validate_path;

/// Name of the recursion primitive; dispatched through the session loop.
pub const TASK_TOOL: &str = "task";
/// Name of the concurrent fan-out primitive; dispatched through the session loop.
pub const BATCH_TOOL: &str = "batch";
