//! The built-in tool set registered at startup.

use std::sync::Arc;

use serde_json::Value;

use rants_domain::error::ToolErrorKind;

use crate::bash::BashTool;
use crate::context::{ToolContext, ToolOutcome};
use crate::file_ops::{EditTool, ListTool, ReadTool, WriteTool};
use crate::registry::{RegisteredTool, ToolExecutor, ToolRegistry};
use crate::{BATCH_TOOL, TASK_TOOL};

/// Build the registry with every built-in tool.
///
/// `task` and `batch` are registered here so their schemas participate in
/// compilation and the transcript digest; their execution is owned by the
/// session loop (`task` reenters through [`crate::Reentry`], `batch` fans
/// out over sibling dispatch).
pub fn builtin_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(RegisteredTool {
        name: "bash".into(),
        description: "Run a shell command inside the workspace and return its output.".into(),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to execute" },
                "timeout_seconds": { "type": "integer", "description": "Hard timeout in seconds" }
            },
            "required": ["command"]
        }),
        executor: Arc::new(BashTool),
    });

    registry.register(RegisteredTool {
        name: "read".into(),
        description: "Read a file from the workspace, optionally a line range.".into(),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "offset": { "type": "integer", "description": "Line number to start from (0-indexed)" },
                "limit": { "type": "integer", "description": "Maximum number of lines" }
            },
            "required": ["path"]
        }),
        executor: Arc::new(ReadTool),
    });

    registry.register(RegisteredTool {
        name: "write".into(),
        description: "Create or overwrite a file in the workspace.".into(),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "content": { "type": "string", "description": "Full file content" }
            },
            "required": ["path", "content"]
        }),
        executor: Arc::new(WriteTool),
    });

    registry.register(RegisteredTool {
        name: "edit".into(),
        description: "Replace the first occurrence of a text span in a workspace file.".into(),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path relative to the workspace root" },
                "find": { "type": "string", "description": "Exact text to find" },
                "replace": { "type": "string", "description": "Replacement text" }
            },
            "required": ["path", "find", "replace"]
        }),
        executor: Arc::new(EditTool),
    });

    registry.register(RegisteredTool {
        name: "list".into(),
        description: "List a workspace directory (directories end with '/').".into(),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory path relative to the workspace root" }
            }
        }),
        executor: Arc::new(ListTool),
    });

    registry.register(RegisteredTool {
        name: TASK_TOOL.into(),
        description: "Run a sub-task as an independent recursive session and return its summary."
            .into(),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "task": { "type": "string", "description": "The task for the sub-session" }
            },
            "required": ["task"]
        }),
        executor: Arc::new(TaskTool),
    });

    registry.register(RegisteredTool {
        name: BATCH_TOOL.into(),
        description: "Run several tool calls concurrently and return all results in order.".into(),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "calls": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "tool": { "type": "string" },
                            "parameters": { "type": "object" }
                        },
                        "required": ["tool", "parameters"]
                    }
                }
            },
            "required": ["calls"]
        }),
        executor: Arc::new(BatchPlaceholder),
    });

    registry
}

/// The recursion primitive: reenters the session loop through the handle on
/// the execution context.
struct TaskTool;

#[async_trait::async_trait]
impl ToolExecutor for TaskTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let task = match params.get("task").and_then(|v| v.as_str()) {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => {
                return ToolOutcome::failure(
                    ToolErrorKind::InvalidParams,
                    "missing required argument: task",
                )
            }
        };
        match &ctx.reentry {
            Some(reentry) => reentry.run_task(task, ctx).await,
            None => ToolOutcome::failure(
                ToolErrorKind::ToolExec,
                "recursive tasks are not available in this mode",
            ),
        }
    }
}

/// `batch` fan-out runs in the session loop, which needs sibling dispatch;
/// this placeholder only fires if a batch call reaches plain execution
/// (a nested batch, which is not supported).
struct BatchPlaceholder;

#[async_trait::async_trait]
impl ToolExecutor for BatchPlaceholder {
    async fn execute(&self, _params: Value, _ctx: &ToolContext) -> ToolOutcome {
        ToolOutcome::failure(ToolErrorKind::ToolExec, "batch calls cannot be nested")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtins_are_registered() {
        let registry = builtin_registry();
        for name in ["bash", "read", "write", "edit", "list", "task", "batch"] {
            assert!(registry.contains(name), "missing tool: {name}");
        }
        assert_eq!(registry.len(), 7);
    }

    #[test]
    fn digest_is_stable_across_builds() {
        assert_eq!(builtin_registry().digest(), builtin_registry().digest());
    }

    #[test]
    fn listing_mentions_the_recursion_primitive() {
        assert!(builtin_registry().listing().contains("- task:"));
    }
}
