//! OpenAI-compatible `/v1/chat/completions`.
//!
//! Two modes. Without `tools[]` the gateway runs the full recursive loop
//! (executing tools itself) and answers in `chat.completion` shape. With
//! `tools[]` it is a shim: one generation + compilation, the resulting
//! calls returned in OpenAI `tool_calls` form with
//! `finish_reason = "tool_calls"`, and no execution — the client executes
//! and sends `role: "tool"` follow-ups, which are treated as ground truth
//! for that turn (no session is persisted in shim mode).

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use rants_domain::error::Error;
use rants_domain::message::{Message, ToolCall};
use rants_domain::session::UserInput;
use rants_domain::stream::{EngineError, EngineEvent, Usage};
use rants_engine::SessionRequest;

use crate::api::auth::Tenant;
use crate::api::error::{api_error, engine_error_response, error_response};
use crate::state::AppState;
use crate::stream::IntentGuard;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(&self) -> String {
        match &self.content {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(parts)) => parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
struct ChatCompletionResponse {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
}

#[derive(Debug, Serialize)]
struct ChatChoice {
    index: u32,
    message: ChatResponseMessage,
    finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatResponseMessage {
    role: &'static str,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Clone, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Clone, Serialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

fn wire_tool_calls(calls: &[ToolCall]) -> Vec<WireToolCall> {
    calls
        .iter()
        .map(|call| WireToolCall {
            id: format!("call_{}", call.id.as_simple()),
            kind: "function",
            function: WireFunction {
                name: call.tool.clone(),
                arguments: call.parameters.to_string(),
            },
        })
        .collect()
}

// ── Streaming chunk types ───────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatChunk {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<ChatChunkChoice>,
}

#[derive(Debug, Serialize)]
struct ChatChunkChoice {
    index: u32,
    delta: ChatChunkDelta,
    finish_reason: Option<&'static str>,
}

#[derive(Debug, Default, Serialize)]
struct ChatChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
}

fn chunk(
    id: &str,
    created: i64,
    model: &str,
    delta: ChatChunkDelta,
    finish_reason: Option<&'static str>,
) -> ChatChunk {
    ChatChunk {
        id: id.to_string(),
        object: "chat.completion.chunk",
        created,
        model: model.to_string(),
        choices: vec![ChatChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat/completions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_completions(
    State(state): State<AppState>,
    Extension(Tenant(tenant)): Extension<Tenant>,
    Json(body): Json<ChatCompletionRequest>,
) -> Response {
    if body.model != state.config.rlm.rants_one.name {
        return error_response(&Error::BadRequest(format!(
            "unknown model '{}'",
            body.model
        )));
    }
    if !body.messages.iter().any(|m| m.role == "user") {
        return error_response(&Error::BadRequest(
            "messages must contain at least one user message".into(),
        ));
    }

    let shim = body.tools.as_ref().is_some_and(|t| !t.is_empty());
    if shim {
        chat_shim(state, body).await
    } else {
        chat_full(state, tenant, body).await
    }
}

// ── Shim mode: one generation + compilation, no execution ───────────

async fn chat_shim(state: AppState, body: ChatCompletionRequest) -> Response {
    let mut system: Option<String> = None;
    let mut history = Vec::new();
    for message in &body.messages {
        let text = message.text();
        match message.role.as_str() {
            "system" if system.is_none() => system = Some(text),
            "system" => history.push(Message::system(text)),
            "user" => history.push(Message::user(text)),
            "assistant" => history.push(Message::assistant(text)),
            "tool" => {
                let call_id = message.tool_call_id.as_deref().unwrap_or("unknown");
                history.push(Message::tool(format!("result for {call_id}: {text}")));
            }
            other => tracing::debug!(role = other, "ignoring unknown chat role"),
        }
    }

    let tool_choice = body
        .tool_choice
        .as_ref()
        .and_then(|v| v.as_str())
        .map(String::from);

    let outcome = match state
        .engine
        .run_shim(
            system.as_deref(),
            history,
            body.temperature,
            body.max_tokens,
            tool_choice.as_deref(),
        )
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => return engine_error_response(&EngineError::from_error(&e)),
    };

    let completion_id = format!("chatcmpl-{}", Uuid::new_v4());
    let created = chrono::Utc::now().timestamp();
    let model = body.model.clone();
    let has_calls = !outcome.tool_calls.is_empty();
    let finish_reason: &'static str = if has_calls { "tool_calls" } else { "stop" };
    let content = if outcome.text.is_empty() {
        None
    } else {
        Some(outcome.text.clone())
    };
    let calls = has_calls.then(|| wire_tool_calls(&outcome.tool_calls));

    if body.stream {
        let stream = async_stream::stream! {
            yield sse_data(&chunk(&completion_id, created, &model, ChatChunkDelta {
                role: Some("assistant"),
                ..ChatChunkDelta::default()
            }, None));
            if let Some(content) = content {
                yield sse_data(&chunk(&completion_id, created, &model, ChatChunkDelta {
                    content: Some(content),
                    ..ChatChunkDelta::default()
                }, None));
            }
            if let Some(calls) = calls {
                yield sse_data(&chunk(&completion_id, created, &model, ChatChunkDelta {
                    tool_calls: Some(calls),
                    ..ChatChunkDelta::default()
                }, None));
            }
            yield sse_data(&chunk(&completion_id, created, &model, ChatChunkDelta::default(), Some(finish_reason)));
            yield Ok(Event::default().data("[DONE]"));
        };
        return Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    }

    Json(ChatCompletionResponse {
        id: completion_id,
        object: "chat.completion",
        created,
        model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatResponseMessage {
                role: "assistant",
                content,
                tool_calls: calls,
            },
            finish_reason,
        }],
        usage: outcome.usage,
    })
    .into_response()
}

// ── Full mode: the recursive loop, chat-shaped output ───────────────

fn session_request(tenant: String, body: &ChatCompletionRequest) -> SessionRequest {
    let system_parts: Vec<String> = body
        .messages
        .iter()
        .filter(|m| m.role == "system")
        .map(|m| m.text())
        .collect();
    // Stateless compat semantics: the last user message is the input for
    // this turn.
    let user_text = body
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.text())
        .unwrap_or_default();

    SessionRequest {
        tenant_id: tenant,
        system: (!system_parts.is_empty()).then(|| system_parts.join("\n")),
        user: UserInput::text(user_text),
        tool_choice: None,
        temperature: body.temperature,
        max_output_tokens: body.max_tokens,
        previous: None,
        previous_response_id: None,
        response_id: None,
    }
}

async fn chat_full(state: AppState, tenant: String, body: ChatCompletionRequest) -> Response {
    let req = session_request(tenant, &body);
    if req.user.text.trim().is_empty() {
        return error_response(&Error::BadRequest("input must not be empty".into()));
    }

    let completion_id = format!("chatcmpl-{}", Uuid::new_v4());
    let created = chrono::Utc::now().timestamp();
    let model = body.model.clone();

    let (_session_id, mut rx, _cancel) = state.engine.clone().run(req);

    if body.stream {
        let stream = async_stream::stream! {
            let mut guard = IntentGuard::new();
            yield sse_data(&chunk(&completion_id, created, &model, ChatChunkDelta {
                role: Some("assistant"),
                ..ChatChunkDelta::default()
            }, None));

            while let Some(event) = rx.recv().await {
                match event {
                    EngineEvent::TextDelta { text } => {
                        let safe = guard.push(&text);
                        if !safe.is_empty() {
                            yield sse_data(&chunk(&completion_id, created, &model, ChatChunkDelta {
                                content: Some(safe),
                                ..ChatChunkDelta::default()
                            }, None));
                        }
                    }
                    EngineEvent::TextDone => {
                        let rest = guard.finish();
                        if !rest.is_empty() {
                            yield sse_data(&chunk(&completion_id, created, &model, ChatChunkDelta {
                                content: Some(rest),
                                ..ChatChunkDelta::default()
                            }, None));
                        }
                    }
                    EngineEvent::Completed { .. } => {
                        yield sse_data(&chunk(&completion_id, created, &model, ChatChunkDelta::default(), Some("stop")));
                    }
                    EngineEvent::Failed { error } => {
                        yield Ok(Event::default().data(
                            crate::api::error::error_body("server_error", &error.message).to_string(),
                        ));
                    }
                    // A tool phase ends one generation; resolving the guard
                    // drops the intent line and anything trailing it,
                    // matching the parsed transcript.
                    EngineEvent::ToolPhaseStarted { .. } => {
                        let rest = guard.finish();
                        if !rest.is_empty() {
                            yield sse_data(&chunk(&completion_id, created, &model, ChatChunkDelta {
                                content: Some(rest),
                                ..ChatChunkDelta::default()
                            }, None));
                        }
                    }
                    EngineEvent::SessionStarted { .. }
                    | EngineEvent::ToolPhaseDone { .. } => {}
                }
            }

            yield Ok(Event::default().data("[DONE]"));
        };
        return Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    }

    let mut completed = None;
    let mut failed = None;
    while let Some(event) = rx.recv().await {
        match event {
            EngineEvent::Completed { response } => completed = Some(response),
            EngineEvent::Failed { error } => failed = Some(error),
            _ => {}
        }
    }
    if let Some(error) = failed {
        return engine_error_response(&error);
    }
    let Some(response) = completed else {
        return api_error(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            "session produced no response",
        );
    };

    Json(ChatCompletionResponse {
        id: completion_id,
        object: "chat.completion",
        created,
        model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatResponseMessage {
                role: "assistant",
                content: Some(response.output_text()),
                tool_calls: None,
            },
            finish_reason: "stop",
        }],
        usage: response.usage,
    })
    .into_response()
}

fn sse_data<T: Serialize>(payload: &T) -> std::result::Result<Event, Infallible> {
    let data = serde_json::to_string(payload).unwrap_or_default();
    Ok(Event::default().data(data))
}
