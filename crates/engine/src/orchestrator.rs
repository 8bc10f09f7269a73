//! The recursive session loop.
//!
//! Per session: generate → parse → (compile → execute → append) → repeat,
//! bounded by depth, iterations, and wallclock. The loop owns all store
//! writes and emits [`EngineEvent`]s over a channel; the streaming assembler
//! renders them for clients. `task` recursion reenters this loop in a child
//! session through the executor context's [`Reentry`] handle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use rants_backend::{BackendRequest, ModelBackend};
use rants_domain::config::Config;
use rants_domain::error::{Error, Result, ToolErrorKind};
use rants_domain::message::{Message, ToolCall, ToolResult};
use rants_domain::response::ResponseObject;
use rants_domain::session::{
    AuditEvent, CanonicalTranscript, RecursiveSession, SessionStatus, Step, UserInput,
};
use rants_domain::stream::{EngineError, EngineEvent, StreamEvent, Usage};
use rants_store::TranscriptStore;
use rants_tools::{
    CancelToken, Reentry, ToolContext, ToolOutcome, ToolRegistry, BATCH_TOOL,
};

use crate::compact::build_compact_context;
use crate::compiler::ToolCompiler;
use crate::prompt::{build_system_prompt, parse_generator_output};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input for one root session.
pub struct SessionRequest {
    pub tenant_id: String,
    pub system: Option<String>,
    pub user: UserInput,
    pub tool_choice: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Transcript loaded via `previous_response_id`, fed to the generator as
    /// history. The new session's own transcript stays independent.
    pub previous: Option<CanonicalTranscript>,
    pub previous_response_id: Option<String>,
    /// Pre-allocated response id, so the HTTP layer can reference it in
    /// `response.created` before the session finishes. Generated when absent.
    pub response_id: Option<String>,
}

/// Result of the chat-shim's one-shot mode: one generation + compilation,
/// no execution, no persisted session.
pub struct ShimOutcome {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Orchestrator {
    config: Arc<Config>,
    store: Arc<TranscriptStore>,
    registry: Arc<ToolRegistry>,
    generator: Arc<dyn ModelBackend>,
    compiler: ToolCompiler,
    /// Absolute sandbox root, resolved at startup.
    workspace_root: PathBuf,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        store: Arc<TranscriptStore>,
        registry: Arc<ToolRegistry>,
        generator: Arc<dyn ModelBackend>,
        compiler_backend: Arc<dyn ModelBackend>,
        workspace_root: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            registry,
            generator,
            compiler: ToolCompiler::new(compiler_backend),
            workspace_root,
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn store(&self) -> &TranscriptStore {
        &self.store
    }

    /// Start a root session. Returns its id, the event stream, and the
    /// cancel token (tripped on client disconnect).
    pub fn run(
        self: Arc<Self>,
        req: SessionRequest,
    ) -> (Uuid, mpsc::Receiver<EngineEvent>, CancelToken) {
        let (tx, rx) = mpsc::channel::<EngineEvent>(64);
        let cancel = CancelToken::new();

        let now = Utc::now();
        let wallclock = self.config.limits.max_wallclock_seconds;
        let session = RecursiveSession {
            id: Uuid::new_v4(),
            parent_id: None,
            tenant_id: req.tenant_id.clone(),
            depth: 0,
            created_at: now,
            deadline_at: now + ChronoDuration::seconds(wallclock as i64),
            status: SessionStatus::Running,
        };
        let session_id = session.id;

        let cancel_for_loop = cancel.clone();
        tokio::spawn(async move {
            self.run_root(session, req, tx, cancel_for_loop).await;
        });

        (session_id, rx, cancel)
    }

    async fn run_root(
        self: Arc<Self>,
        session: RecursiveSession,
        req: SessionRequest,
        tx: mpsc::Sender<EngineEvent>,
        cancel: CancelToken,
    ) {
        // Continuations inherit the stored system prompt unless the request
        // carries its own.
        let system = req
            .system
            .clone()
            .or_else(|| req.previous.as_ref().and_then(|p| p.system.clone()));
        let mut transcript =
            CanonicalTranscript::new(system, req.user.clone(), self.registry.digest());

        if let Err(e) = self.store.create_session(&session, &transcript) {
            tracing::error!(session_id = %session.id, error = %e, "failed to create session");
            let _ = tx
                .send(EngineEvent::Failed {
                    error: EngineError::from_error(&e),
                })
                .await;
            return;
        }

        let _ = tx
            .send(EngineEvent::SessionStarted {
                session_id: session.id,
            })
            .await;

        // Tenant workspaces are subdirectories of the process-wide root:
        // shared across a tenant's sessions, invisible to other tenants.
        if let Err(e) = std::fs::create_dir_all(self.workspace_root.join(&session.tenant_id)) {
            tracing::warn!(
                tenant = %session.tenant_id,
                error = %e,
                "failed to create tenant workspace"
            );
        }

        let deadline = Instant::now()
            + (session.deadline_at - Utc::now())
                .to_std()
                .unwrap_or_default();
        let mut usage = Usage::default();

        let result = self
            .clone()
            .run_loop(
                &session,
                &mut transcript,
                req.previous.as_ref(),
                Some(&tx),
                &cancel,
                deadline,
                &mut usage,
                req.temperature,
                req.max_output_tokens,
                req.tool_choice.as_deref(),
            )
            .await;

        match result {
            Ok(()) => {
                let text: String = transcript
                    .steps
                    .iter()
                    .map(|s| s.generator_output.as_str())
                    .collect();
                let response = ResponseObject::assistant_text(
                    req.response_id
                        .unwrap_or_else(|| format!("resp_{}", Uuid::new_v4().as_simple())),
                    Utc::now().timestamp(),
                    self.config.rlm.rants_one.name.clone(),
                    text,
                    Some(usage),
                    req.previous_response_id,
                );
                if let Err(e) = self
                    .store
                    .persist_response(&response, &session.tenant_id, session.id)
                {
                    tracing::error!(session_id = %session.id, error = %e, "failed to persist response");
                    let _ = self.store.update_status(session.id, SessionStatus::Failed);
                    let _ = tx
                        .send(EngineEvent::Failed {
                            error: EngineError::from_error(&e),
                        })
                        .await;
                    return;
                }
                let _ = self
                    .store
                    .update_status(session.id, SessionStatus::Completed);
                let _ = tx.send(EngineEvent::TextDone).await;
                let _ = tx.send(EngineEvent::Completed { response }).await;
            }
            Err(e) => {
                let status = match e {
                    Error::Cancelled => SessionStatus::Cancelled,
                    _ => SessionStatus::Failed,
                };
                let _ = self.store.update_status(session.id, status);
                // Full detail stays server-side; the event carries the
                // client-safe rendering.
                tracing::warn!(session_id = %session.id, error = %e, "session failed");
                let _ = tx
                    .send(EngineEvent::Failed {
                        error: EngineError::from_error(&e),
                    })
                    .await;
            }
        }
    }

    // ── The loop ──────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn run_loop(
        self: Arc<Self>,
        session: &RecursiveSession,
        transcript: &mut CanonicalTranscript,
        history: Option<&CanonicalTranscript>,
        tx: Option<&mpsc::Sender<EngineEvent>>,
        cancel: &CancelToken,
        deadline: Instant,
        usage: &mut Usage,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
        tool_choice: Option<&str>,
    ) -> Result<()> {
        let max_iterations = self
            .config
            .limits
            .max_tool_iterations
            .min(self.config.rlm.rants_one.max_iterations);
        let system_prompt =
            build_system_prompt(transcript.system.as_deref(), &self.registry, tool_choice);

        for iteration in 0..max_iterations {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded);
            }
            tracing::debug!(session_id = %session.id, iteration, "loop iteration");

            let started_at = Utc::now();
            let messages = assemble_messages(&system_prompt, history, transcript);
            let req = BackendRequest {
                messages,
                temperature,
                max_tokens,
                deadline: Some(deadline),
                ..BackendRequest::default()
            };

            let raw = self.generate(&req, tx, cancel, usage).await?;
            let (text, intent) = parse_generator_output(&raw);

            let step_index = transcript.steps.len() as u32;
            let mut step = Step::started(started_at);
            step.generator_output = text;
            step.tool_intent = intent.clone();

            // No intent: terminal step, loop ends.
            let Some(intent) = intent else {
                let finished = Utc::now();
                self.store.append_step(session.id, step_index, &step)?;
                self.store.finalize_step(session.id, step_index, &[], finished)?;
                step.finished_at = Some(finished);
                transcript.steps.push(step);
                return Ok(());
            };

            if let Some(tx) = tx {
                let _ = tx.send(EngineEvent::ToolPhaseStarted { step_index }).await;
            }

            let compact = build_compact_context(transcript);
            let calls = self
                .compiler
                .compile(&self.registry, &compact, &intent, Some(deadline))
                .await?;

            // Zero calls despite a non-empty intent: recorded, loop ends.
            // The client only sees a normal completion.
            if calls.is_empty() {
                tracing::warn!(
                    session_id = %session.id,
                    step_index,
                    intent = %intent,
                    "compiler produced no tool calls for a non-empty intent"
                );
                let finished = Utc::now();
                self.store.append_step(session.id, step_index, &step)?;
                self.store.finalize_step(session.id, step_index, &[], finished)?;
                step.finished_at = Some(finished);
                transcript.steps.push(step);
                if let Some(tx) = tx {
                    let _ = tx.send(EngineEvent::ToolPhaseDone { step_index }).await;
                }
                return Ok(());
            }

            step.tool_calls = calls;
            self.store.append_step(session.id, step_index, &step)?;

            // Execute in declared order. A failing call never aborts the
            // step; its result is observed by the next generation.
            let ctx = self.clone().tool_context(session, deadline, cancel.clone());
            let mut results = Vec::with_capacity(step.tool_calls.len());
            for call in &step.tool_calls {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let call_started = Utc::now();
                let outcome = self.dispatch_call(call, &ctx).await;
                results.push(ToolResult {
                    call_id: call.id,
                    ok: outcome.ok,
                    output: outcome.output,
                    error_kind: outcome.error_kind,
                    started_at: call_started,
                    finished_at: Utc::now(),
                    bytes_truncated: outcome.bytes_truncated,
                });
            }

            let finished_at = Utc::now();
            self.store
                .finalize_step(session.id, step_index, &results, finished_at)?;

            for (call, result) in step.tool_calls.iter().zip(results.iter()) {
                let event = AuditEvent {
                    tenant_id: session.tenant_id.clone(),
                    session_id: session.id,
                    step_index,
                    call_id: call.id,
                    tool: call.tool.clone(),
                    ok: result.ok,
                    error_kind: result.error_kind,
                    timestamp: result.finished_at,
                    size_before: call.parameters.to_string().len() as u64,
                    size_after: result.output.len() as u64,
                };
                if let Err(e) = self.store.record_audit(&event) {
                    tracing::warn!(session_id = %session.id, error = %e, "audit write failed");
                }
            }

            step.tool_results = results;
            step.finished_at = Some(finished_at);
            transcript.steps.push(step);

            if let Some(tx) = tx {
                let _ = tx.send(EngineEvent::ToolPhaseDone { step_index }).await;
            }
        }

        // Iteration cap: finalize a synthetic terminal step, no further
        // compilation, and complete normally.
        tracing::debug!(session_id = %session.id, max_iterations, "iteration cap reached");
        let now = Utc::now();
        let step_index = transcript.steps.len() as u32;
        let mut terminal = Step::started(now);
        self.store.append_step(session.id, step_index, &terminal)?;
        self.store.finalize_step(session.id, step_index, &[], now)?;
        terminal.finished_at = Some(now);
        transcript.steps.push(terminal);
        Ok(())
    }

    /// One generation: streaming (forwarding deltas) when a channel is
    /// present, blocking otherwise. A dropped channel means the client
    /// disconnected and cancels the session.
    async fn generate(
        &self,
        req: &BackendRequest,
        tx: Option<&mpsc::Sender<EngineEvent>>,
        cancel: &CancelToken,
        usage: &mut Usage,
    ) -> Result<String> {
        let Some(tx) = tx else {
            let result = self.generator.complete(req).await?;
            if let Some(u) = result.usage {
                usage.accumulate(&u);
            }
            return Ok(result.text);
        };

        let mut stream = self.generator.stream(req).await?;
        let mut raw = String::new();
        while let Some(event) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match event? {
                StreamEvent::Token { text } => {
                    raw.push_str(&text);
                    if tx.send(EngineEvent::TextDelta { text }).await.is_err() {
                        cancel.cancel();
                        return Err(Error::Cancelled);
                    }
                }
                StreamEvent::Done { usage: u, .. } => {
                    if let Some(u) = u {
                        usage.accumulate(&u);
                    }
                }
            }
        }
        Ok(raw)
    }

    // ── Dispatch ──────────────────────────────────────────────────

    fn tool_context(
        self: Arc<Self>,
        session: &RecursiveSession,
        deadline: Instant,
        cancel: CancelToken,
    ) -> ToolContext {
        ToolContext {
            workspace_root: self.workspace_root.join(&session.tenant_id),
            deadline,
            tenant_id: session.tenant_id.clone(),
            session_id: session.id,
            max_output_bytes: self.config.tools.max_output_bytes,
            bash_timeout_seconds: self.config.tools.bash_timeout_seconds,
            cancel,
            reentry: Some(Arc::new(TaskReentry {
                orchestrator: self,
                parent: session.clone(),
            })),
        }
    }

    async fn dispatch_call(&self, call: &ToolCall, ctx: &ToolContext) -> ToolOutcome {
        if ctx.cancel.is_cancelled() {
            return ToolOutcome::failure(ToolErrorKind::Cancelled, "session cancelled");
        }
        if call.tool == BATCH_TOOL {
            return self.dispatch_batch(&call.parameters, ctx).await;
        }
        match self.registry.get(&call.tool) {
            Some(tool) => tool.executor.execute(call.parameters.clone(), ctx).await,
            None => ToolOutcome::failure(
                ToolErrorKind::ToolExec,
                format!("unknown tool '{}'", call.tool),
            ),
        }
    }

    /// `batch`: run children concurrently, wait for all, fold the outcomes
    /// into one result whose order matches the declared child order.
    async fn dispatch_batch(&self, params: &Value, ctx: &ToolContext) -> ToolOutcome {
        let Some(children) = params.get("calls").and_then(|v| v.as_array()) else {
            return ToolOutcome::failure(
                ToolErrorKind::InvalidParams,
                "missing required argument: calls",
            );
        };

        let futures: Vec<_> = children
            .iter()
            .map(|child| {
                let tool = child
                    .get("tool")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let parameters = child
                    .get("parameters")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Default::default()));
                async move {
                    let outcome = if tool == BATCH_TOOL {
                        ToolOutcome::failure(ToolErrorKind::ToolExec, "batch calls cannot be nested")
                    } else {
                        match self.registry.get(&tool) {
                            Some(t) => t.executor.execute(parameters, ctx).await,
                            None => ToolOutcome::failure(
                                ToolErrorKind::ToolExec,
                                format!("unknown tool '{tool}'"),
                            ),
                        }
                    };
                    (tool, outcome)
                }
            })
            .collect();

        // join_all preserves declared order regardless of completion order.
        let outcomes = futures_util::future::join_all(futures).await;

        let all_ok = outcomes.iter().all(|(_, o)| o.ok);
        let truncated: u64 = outcomes.iter().map(|(_, o)| o.bytes_truncated).sum();
        let combined: Vec<Value> = outcomes
            .into_iter()
            .map(|(tool, o)| {
                serde_json::json!({
                    "tool": tool,
                    "ok": o.ok,
                    "output": o.output,
                    "error_kind": o.error_kind,
                })
            })
            .collect();

        ToolOutcome {
            ok: all_ok,
            output: serde_json::to_string(&combined).unwrap_or_default(),
            error_kind: if all_ok { None } else { Some(ToolErrorKind::ToolExec) },
            bytes_truncated: truncated,
        }
        .clamped(ctx.max_output_bytes)
    }

    // ── Chat shim one-shot mode ───────────────────────────────────

    /// One generation + compilation over client-supplied ground truth.
    /// Nothing executes and nothing persists; the caller carries the calls
    /// back to the client in wire form.
    pub async fn run_shim(
        &self,
        system: Option<&str>,
        history: Vec<Message>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
        tool_choice: Option<&str>,
    ) -> Result<ShimOutcome> {
        let system_prompt = build_system_prompt(system, &self.registry, tool_choice);
        let mut messages = vec![Message::system(&system_prompt)];
        messages.extend(history);

        let req = BackendRequest {
            messages,
            temperature,
            max_tokens,
            ..BackendRequest::default()
        };
        let result = self.generator.complete(&req).await?;
        let (text, intent) = parse_generator_output(&result.text);

        let tool_calls = match intent {
            Some(intent) => {
                let context = format!("user: {}", last_user_text(&req.messages));
                self.compiler
                    .compile(&self.registry, &context, &intent, None)
                    .await?
            }
            None => Vec::new(),
        };

        Ok(ShimOutcome {
            text,
            tool_calls,
            usage: result.usage,
        })
    }
}

fn last_user_text(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == rants_domain::message::Role::User)
        .map(|m| m.content.extract_all_text())
        .unwrap_or_default()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn assemble_messages(
    system_prompt: &str,
    history: Option<&CanonicalTranscript>,
    transcript: &CanonicalTranscript,
) -> Vec<Message> {
    let mut messages = vec![Message::system(system_prompt)];
    if let Some(prev) = history {
        messages.push(Message::user(prev.user.text.clone()));
        append_step_messages(&mut messages, &prev.steps);
    }
    messages.push(Message::user(transcript.user.text.clone()));
    append_step_messages(&mut messages, &transcript.steps);
    messages
}

/// Reconstruct assistant turns as the generator actually produced them
/// (visible text plus its intent line) and tool results as tool-role turns.
fn append_step_messages(messages: &mut Vec<Message>, steps: &[Step]) {
    for step in steps {
        let mut assistant = step.generator_output.clone();
        if let Some(intent) = &step.tool_intent {
            if !assistant.is_empty() && !assistant.ends_with('\n') {
                assistant.push('\n');
            }
            assistant.push_str(&format!("TOOL_INTENT: {intent}"));
        }
        if !assistant.is_empty() {
            messages.push(Message::assistant(assistant));
        }
        for (call, result) in step.tool_calls.iter().zip(step.tool_results.iter()) {
            let status = if result.ok { "ok" } else { "error" };
            messages.push(Message::tool(format!(
                "{} ({status}): {}",
                call.tool, result.output
            )));
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task recursion
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct TaskReentry {
    orchestrator: Arc<Orchestrator>,
    parent: RecursiveSession,
}

#[async_trait::async_trait]
impl Reentry for TaskReentry {
    async fn run_task(&self, task: String, ctx: &ToolContext) -> ToolOutcome {
        let orch = &self.orchestrator;
        let max_depth = orch.config.rlm.rants_one.max_depth;
        let child_depth = self.parent.depth + 1;
        if child_depth > max_depth {
            return ToolOutcome::failure(
                ToolErrorKind::RecursionLimit,
                format!("recursion depth {child_depth} exceeds max_depth {max_depth}"),
            );
        }

        // Independent transcript; the parent's steps are not visible.
        // Wallclock is inherited: the child shares the parent's deadline.
        let child = RecursiveSession {
            id: Uuid::new_v4(),
            parent_id: Some(self.parent.id),
            tenant_id: self.parent.tenant_id.clone(),
            depth: child_depth,
            created_at: Utc::now(),
            deadline_at: self.parent.deadline_at,
            status: SessionStatus::Running,
        };
        let mut transcript =
            CanonicalTranscript::new(None, UserInput::text(task), orch.registry.digest());

        if let Err(e) = orch.store.create_session(&child, &transcript) {
            return ToolOutcome::failure(ToolErrorKind::ToolExec, format!("sub-task setup failed: {e}"));
        }
        tracing::debug!(
            parent = %self.parent.id,
            child = %child.id,
            depth = child_depth,
            "task recursion started"
        );

        let mut usage = Usage::default();
        let result = orch
            .clone()
            .run_loop(
                &child,
                &mut transcript,
                None,
                None,
                &ctx.cancel,
                ctx.deadline,
                &mut usage,
                None,
                None,
                None,
            )
            .await;

        match result {
            Ok(()) => {
                let _ = orch.store.update_status(child.id, SessionStatus::Completed);
                let summary =
                    summarize(&transcript, orch.config.tools.task_summary_bytes);
                ToolOutcome::success(summary)
            }
            Err(Error::DeadlineExceeded) => {
                let _ = orch.store.update_status(child.id, SessionStatus::Failed);
                ToolOutcome::failure(ToolErrorKind::DeadlineExceeded, "sub-task deadline exceeded")
            }
            Err(Error::Cancelled) => {
                let _ = orch.store.update_status(child.id, SessionStatus::Cancelled);
                ToolOutcome::failure(ToolErrorKind::Cancelled, "sub-task cancelled")
            }
            Err(e) => {
                let _ = orch.store.update_status(child.id, SessionStatus::Failed);
                ToolOutcome::failure(ToolErrorKind::ToolExec, format!("sub-task failed: {e}"))
            }
        }
    }
}

/// Condense a finished child transcript: the last non-empty user-visible
/// output, truncated to the configured byte cap.
fn summarize(transcript: &CanonicalTranscript, cap: usize) -> String {
    let last = transcript
        .steps
        .iter()
        .rev()
        .map(|s| s.generator_output.trim())
        .find(|t| !t.is_empty())
        .unwrap_or("");
    let mut end = last.len().min(cap);
    while end > 0 && !last.is_char_boundary(end) {
        end -= 1;
    }
    last[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_picks_last_non_empty_output() {
        let mut tx = CanonicalTranscript::new(None, UserInput::text("t"), "d".into());
        let mut s1 = Step::started(Utc::now());
        s1.generator_output = "first".into();
        let mut s2 = Step::started(Utc::now());
        s2.generator_output = "3 files, 420 LOC total.".into();
        let s3 = Step::started(Utc::now()); // synthetic terminal, empty
        tx.steps = vec![s1, s2, s3];
        assert_eq!(summarize(&tx, 2048), "3 files, 420 LOC total.");
    }

    #[test]
    fn summarize_truncates_at_cap() {
        let mut tx = CanonicalTranscript::new(None, UserInput::text("t"), "d".into());
        let mut s = Step::started(Utc::now());
        s.generator_output = "x".repeat(100);
        tx.steps = vec![s];
        assert_eq!(summarize(&tx, 10).len(), 10);
    }

    #[test]
    fn assemble_messages_reconstructs_history() {
        let mut prev = CanonicalTranscript::new(None, UserInput::text("old input"), "d".into());
        let mut step = Step::started(Utc::now());
        step.generator_output = "old answer".into();
        prev.steps = vec![step];

        let current = CanonicalTranscript::new(None, UserInput::text("new input"), "d".into());
        let messages = assemble_messages("sys", Some(&prev), &current);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].content.extract_all_text(), "sys");
        assert_eq!(messages[1].content.extract_all_text(), "old input");
        assert_eq!(messages[2].content.extract_all_text(), "old answer");
        assert_eq!(messages[3].content.extract_all_text(), "new input");
    }
}
