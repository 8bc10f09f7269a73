//! `bash` tool — run a shell command in the workspace, foreground, killable.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use rants_domain::error::ToolErrorKind;

use crate::context::{CancelToken, ToolContext, ToolOutcome};
use crate::registry::ToolExecutor;

#[derive(Debug, Clone, Deserialize)]
struct BashRequest {
    command: String,
    /// Override the configured hard timeout (seconds).
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

pub struct BashTool;

#[async_trait::async_trait]
impl ToolExecutor for BashTool {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome {
        let req: BashRequest = match serde_json::from_value(params) {
            Ok(r) => r,
            Err(e) => {
                return ToolOutcome::failure(
                    ToolErrorKind::InvalidParams,
                    format!("invalid bash arguments: {e}"),
                )
            }
        };

        // Effective budget: the configured timeout bounded by the session
        // deadline.
        let now = Instant::now();
        if now >= ctx.deadline {
            return ToolOutcome::failure(ToolErrorKind::DeadlineExceeded, "session deadline exceeded");
        }
        let remaining = ctx.deadline - now;
        let timeout = Duration::from_secs(req.timeout_seconds.unwrap_or(ctx.bash_timeout_seconds))
            .min(remaining);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&req.command)
            .current_dir(&ctx.workspace_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout/cancel must not leave the
            // child running.
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return ToolOutcome::failure(
                    ToolErrorKind::ToolExec,
                    format!("failed to spawn: {e}"),
                )
            }
        };

        let cancel = ctx.cancel.clone();
        tokio::select! {
            result = child.wait_with_output() => match result {
                Ok(output) => {
                    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                    combined.push_str(&String::from_utf8_lossy(&output.stderr));
                    if output.status.success() {
                        ToolOutcome::success(combined).clamped(ctx.max_output_bytes)
                    } else {
                        let code = output.status.code().unwrap_or(-1);
                        combined.push_str(&format!("\n[exit code {code}]"));
                        ToolOutcome {
                            ok: false,
                            output: combined,
                            error_kind: Some(ToolErrorKind::ToolExec),
                            bytes_truncated: 0,
                        }
                        .clamped(ctx.max_output_bytes)
                    }
                }
                Err(e) => ToolOutcome::failure(
                    ToolErrorKind::ToolExec,
                    format!("waiting for child failed: {e}"),
                ),
            },
            _ = tokio::time::sleep(timeout) => {
                let kind = if timeout == remaining {
                    ToolErrorKind::DeadlineExceeded
                } else {
                    ToolErrorKind::ToolExec
                };
                ToolOutcome::failure(kind, format!("command timed out after {}s", timeout.as_secs()))
            }
            _ = wait_cancelled(cancel) => {
                ToolOutcome::failure(ToolErrorKind::Cancelled, "command cancelled")
            }
        }
    }
}

async fn wait_cancelled(cancel: CancelToken) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
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
    async fn echo_succeeds() {
        let ws = TempDir::new().unwrap();
        let out = BashTool
            .execute(serde_json::json!({"command": "echo hi"}), &ctx(ws.path().into()))
            .await;
        assert!(out.ok);
        assert_eq!(out.output.trim(), "hi");
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure_with_output() {
        let ws = TempDir::new().unwrap();
        let out = BashTool
            .execute(
                serde_json::json!({"command": "echo oops >&2; exit 3"}),
                &ctx(ws.path().into()),
            )
            .await;
        assert!(!out.ok);
        assert_eq!(out.error_kind, Some(ToolErrorKind::ToolExec));
        assert!(out.output.contains("oops"));
        assert!(out.output.contains("[exit code 3]"));
    }

    #[tokio::test]
    async fn runs_in_workspace_root() {
        let ws = TempDir::new().unwrap();
        std::fs::write(ws.path().join("marker.txt"), "here").unwrap();
        let out = BashTool
            .execute(serde_json::json!({"command": "ls"}), &ctx(ws.path().into()))
            .await;
        assert!(out.ok);
        assert!(out.output.contains("marker.txt"));
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let ws = TempDir::new().unwrap();
        let out = BashTool
            .execute(
                serde_json::json!({"command": "sleep 5", "timeout_seconds": 1}),
                &ctx(ws.path().into()),
            )
            .await;
        assert!(!out.ok);
        assert_eq!(out.error_kind, Some(ToolErrorKind::ToolExec));
        assert!(out.output.contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_is_observed() {
        let ws = TempDir::new().unwrap();
        let context = ctx(ws.path().into());
        let cancel = context.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });
        let out = BashTool
            .execute(serde_json::json!({"command": "sleep 5"}), &context)
            .await;
        assert!(!out.ok);
        assert_eq!(out.error_kind, Some(ToolErrorKind::Cancelled));
    }

    #[tokio::test]
    async fn invalid_params_are_rejected() {
        let ws = TempDir::new().unwrap();
        let out = BashTool
            .execute(serde_json::json!({"cmd": "echo hi"}), &ctx(ws.path().into()))
            .await;
        assert!(!out.ok);
        assert_eq!(out.error_kind, Some(ToolErrorKind::InvalidParams));
    }

    #[tokio::test]
    async fn oversized_output_is_clamped() {
        let ws = TempDir::new().unwrap();
        let mut context = ctx(ws.path().into());
        context.max_output_bytes = 32;
        let out = BashTool
            .execute(
                serde_json::json!({"command": "yes x | head -n 100"}),
                &context,
            )
            .await;
        assert!(out.ok);
        assert!(out.bytes_truncated > 0);
        assert!(out.output.contains("[output truncated]"));
    }
}
