//! File tools — safe, auditable file I/O constrained to the workspace root.
//!
//! Paths are validated through [`crate::sandbox::validate_path`]; anything
//! escaping the root is a `SandboxViolation` result, never an error the
//! session loop has to handle.

use serde::Deserialize;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use rants_domain::error::ToolErrorKind;

use crate::context::{ToolContext, ToolOutcome};
use crate::registry::ToolExecutor;
use crate::sandbox::validate_path;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
struct ReadRequest {
    path: String,
    /// Line number to start from (0-indexed).
    #[serde(default)]
    offset: Option<usize>,
    /// Maximum number of lines to return.
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct WriteRequest {
    path: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct EditRequest {
    path: String,
    find: String,
    replace: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ListRequest {
    #[serde(default = "default_dot")]
    path: String,
}

fn default_dot() -> String {
    ".".into()
}

fn parse_params<T: serde::de::DeserializeOwned>(tool: &str, params: Value) -> Result<T, ToolOutcome> {
    serde_json::from_value(params).map_err(|e| {
        ToolOutcome::failure(
            ToolErrorKind::InvalidParams,
            format!("invalid {tool} arguments: {e}"),
        )
    })
}

fn sandboxed(ctx: &ToolContext, requested: &str) -> Result<std::path::PathBuf, ToolOutcome> {
    validate_path(&ctx.workspace_root, requested)
        .map_err(|e| ToolOutcome::failure(ToolErrorKind::SandboxViolation, e))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// read
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ReadTool;

#[async_trait::async_trait]
impl ToolExecutor for ReadTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let req: ReadRequest = match parse_params("read", params) {
            Ok(r) => r,
            Err(out) => return out,
        };
        let path = match sandboxed(ctx, &req.path) {
            Ok(p) => p,
            Err(out) => return out,
        };

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                return ToolOutcome::failure(
                    ToolErrorKind::ToolExec,
                    format!("failed to read '{}': {e}", req.path),
                )
            }
        };

        let lines: Vec<&str> = content.lines().collect();
        let offset = req.offset.unwrap_or(0);
        let limit = req.limit.unwrap_or(lines.len().saturating_sub(offset));
        let selected = lines
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect::<Vec<_>>()
            .join("\n");

        ToolOutcome::success(selected).clamped(ctx.max_output_bytes)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// write
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct WriteTool;

#[async_trait::async_trait]
impl ToolExecutor for WriteTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let req: WriteRequest = match parse_params("write", params) {
            Ok(r) => r,
            Err(out) => return out,
        };
        let path = match sandboxed(ctx, &req.path) {
            Ok(p) => p,
            Err(out) => return out,
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolOutcome::failure(
                    ToolErrorKind::ToolExec,
                    format!("failed to create parent directory: {e}"),
                );
            }
        }

        match write_atomic(&path, &req.content).await {
            Ok(()) => ToolOutcome::success(format!(
                "wrote {} bytes to {}",
                req.content.len(),
                req.path
            )),
            Err(e) => ToolOutcome::failure(ToolErrorKind::ToolExec, e),
        }
    }
}

/// Atomic write: write to a uniquely-named .tmp sibling, sync, then rename.
async fn write_atomic(path: &std::path::Path, content: &str) -> Result<(), String> {
    let tmp_name = format!(
        ".{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        uuid::Uuid::new_v4().as_simple()
    );
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp_path)
        .await
        .map_err(|e| format!("failed to create temp file '{}': {e}", tmp_path.display()))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| format!("failed to write temp file: {e}"))?;
    file.flush()
        .await
        .map_err(|e| format!("failed to flush temp file: {e}"))?;
    file.sync_data()
        .await
        .map_err(|e| format!("failed to sync temp file: {e}"))?;

    fs::rename(&tmp_path, path).await.map_err(|e| {
        let tmp = tmp_path.clone();
        tokio::spawn(async move {
            let _ = fs::remove_file(&tmp).await;
        });
        format!("failed to rename temp file into place: {e}")
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// edit
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct EditTool;

#[async_trait::async_trait]
impl ToolExecutor for EditTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let req: EditRequest = match parse_params("edit", params) {
            Ok(r) => r,
            Err(out) => return out,
        };
        let path = match sandboxed(ctx, &req.path) {
            Ok(p) => p,
            Err(out) => return out,
        };

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                return ToolOutcome::failure(
                    ToolErrorKind::ToolExec,
                    format!("failed to read '{}': {e}", req.path),
                )
            }
        };

        let Some(at) = content.find(&req.find) else {
            return ToolOutcome::failure(
                ToolErrorKind::ToolExec,
                format!("find text not present in '{}'", req.path),
            );
        };
        let mut edited = String::with_capacity(content.len());
        edited.push_str(&content[..at]);
        edited.push_str(&req.replace);
        edited.push_str(&content[at + req.find.len()..]);

        match write_atomic(&path, &edited).await {
            Ok(()) => ToolOutcome::success(format!("edited {}", req.path)),
            Err(e) => ToolOutcome::failure(ToolErrorKind::ToolExec, e),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// list
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ListTool;

#[async_trait::async_trait]
impl ToolExecutor for ListTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let req: ListRequest = match parse_params("list", params) {
            Ok(r) => r,
            Err(out) => return out,
        };
        let path = match sandboxed(ctx, &req.path) {
            Ok(p) => p,
            Err(out) => return out,
        };

        let mut read_dir = match fs::read_dir(&path).await {
            Ok(rd) => rd,
            Err(e) => {
                return ToolOutcome::failure(
                    ToolErrorKind::ToolExec,
                    format!("failed to read directory '{}': {e}", req.path),
                )
            }
        };

        let mut entries: Vec<String> = Vec::new();
        loop {
            match read_dir.next_entry().await {
                Ok(Some(entry)) => {
                    let name = entry.file_name().to_string_lossy().to_string();
                    let is_dir = entry
                        .file_type()
                        .await
                        .map(|t| t.is_dir())
                        .unwrap_or(false);
                    entries.push(if is_dir { format!("{name}/") } else { name });
                }
                Ok(None) => break,
                Err(e) => {
                    return ToolOutcome::failure(
                        ToolErrorKind::ToolExec,
                        format!("failed to read directory entry: {e}"),
                    )
                }
            }
        }

        // Sorted for deterministic output.
        entries.sort();
        ToolOutcome::success(entries.join("\n")).clamped(ctx.max_output_bytes)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelToken;
    use serde_json::json;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn ctx(root: PathBuf) -> ToolContext {
        ToolContext {
            workspace_root: root,
            deadline: Instant::now() + Duration::from_secs(30),
            tenant_id: "anonymous".into(),
            session_id: Uuid::new_v4(),
            max_output_bytes: 4096,
            bash_timeout_seconds: 10,
            cancel: CancelToken::new(),
            reentry: None,
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let ws = TempDir::new().unwrap();
        let c = ctx(ws.path().into());

        let out = WriteTool
            .execute(json!({"path": "notes.txt", "content": "alpha\nbeta\n"}), &c)
            .await;
        assert!(out.ok, "{}", out.output);

        let out = ReadTool.execute(json!({"path": "notes.txt"}), &c).await;
        assert!(out.ok);
        assert_eq!(out.output, "alpha\nbeta");
    }

    #[tokio::test]
    async fn read_with_offset_and_limit() {
        let ws = TempDir::new().unwrap();
        let c = ctx(ws.path().into());
        std::fs::write(ws.path().join("lines.txt"), "l0\nl1\nl2\nl3\n").unwrap();

        let out = ReadTool
            .execute(json!({"path": "lines.txt", "offset": 1, "limit": 2}), &c)
            .await;
        assert!(out.ok);
        assert_eq!(out.output, "l1\nl2");
    }

    #[tokio::test]
    async fn read_missing_file_is_tool_exec_failure() {
        let ws = TempDir::new().unwrap();
        let out = ReadTool
            .execute(json!({"path": "ghost.txt"}), &ctx(ws.path().into()))
            .await;
        assert!(!out.ok);
        assert_eq!(out.error_kind, Some(ToolErrorKind::ToolExec));
    }

    #[tokio::test]
    async fn escape_attempt_is_sandbox_violation() {
        let ws = TempDir::new().unwrap();
        let out = ReadTool
            .execute(json!({"path": "../secrets"}), &ctx(ws.path().into()))
            .await;
        assert!(!out.ok);
        assert_eq!(out.error_kind, Some(ToolErrorKind::SandboxViolation));
    }

    #[tokio::test]
    async fn edit_replaces_first_occurrence() {
        let ws = TempDir::new().unwrap();
        let c = ctx(ws.path().into());
        std::fs::write(ws.path().join("README.md"), "# Title\n\nbroken block\n").unwrap();

        let out = EditTool
            .execute(
                json!({"path": "README.md", "find": "broken block", "replace": "fixed block"}),
                &c,
            )
            .await;
        assert!(out.ok, "{}", out.output);

        let content = std::fs::read_to_string(ws.path().join("README.md")).unwrap();
        assert_eq!(content, "# Title\n\nfixed block\n");
    }

    #[tokio::test]
    async fn edit_missing_find_text_fails() {
        let ws = TempDir::new().unwrap();
        let c = ctx(ws.path().into());
        std::fs::write(ws.path().join("a.txt"), "content").unwrap();

        let out = EditTool
            .execute(json!({"path": "a.txt", "find": "absent", "replace": "x"}), &c)
            .await;
        assert!(!out.ok);
        assert_eq!(out.error_kind, Some(ToolErrorKind::ToolExec));
    }

    #[tokio::test]
    async fn list_is_sorted_and_marks_dirs() {
        let ws = TempDir::new().unwrap();
        let c = ctx(ws.path().into());
        std::fs::write(ws.path().join("b.txt"), "").unwrap();
        std::fs::write(ws.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(ws.path().join("sub")).unwrap();

        let out = ListTool.execute(json!({}), &c).await;
        assert!(out.ok);
        assert_eq!(out.output, "a.txt\nb.txt\nsub/");
    }

    #[tokio::test]
    async fn write_creates_nested_directories() {
        let ws = TempDir::new().unwrap();
        let c = ctx(ws.path().into());

        let out = WriteTool
            .execute(json!({"path": "deep/nested/file.txt", "content": "x"}), &c)
            .await;
        assert!(out.ok, "{}", out.output);
        assert!(ws.path().join("deep/nested/file.txt").exists());
    }
}
