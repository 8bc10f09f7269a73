//! `POST /v1/responses` — the primary surface. The gateway runs the full
//! recursive loop and executes tools itself; streaming renders the engine
//! event stream as Responses-API SSE.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde::Deserialize;
use uuid::Uuid;

use rants_domain::error::{Error, Result};
use rants_domain::session::UserInput;
use rants_domain::stream::EngineEvent;
use rants_engine::SessionRequest;

use crate::api::auth::Tenant;
use crate::api::error::{api_error, engine_error_response, error_response};
use crate::state::AppState;
use crate::stream::IntentGuard;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ResponsesRequest {
    pub model: String,
    #[serde(default)]
    pub input: Option<InputField>,
    /// Accepted for wire compatibility. The executed tool set is fixed
    /// server-side at startup.
    #[serde(default)]
    pub tools: Option<serde_json::Value>,
    #[serde(default)]
    pub tool_choice: Option<serde_json::Value>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub previous_response_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum InputField {
    Text(String),
    Messages(Vec<InputMessage>),
}

#[derive(Debug, Deserialize)]
pub struct InputMessage {
    pub role: String,
    pub content: serde_json::Value,
}

// ── Input normalization ─────────────────────────────────────────────

/// Flatten a content value: a plain string, or an array of text/image
/// parts.
fn content_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter_map(|p| {
                p.get("text")
                    .and_then(|t| t.as_str())
                    .map(str::to_string)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn normalize_input(input: Option<InputField>) -> Result<(Option<String>, UserInput)> {
    let (system, user_text) = match input {
        Some(InputField::Text(text)) => (None, text),
        Some(InputField::Messages(messages)) => {
            let mut system_parts = Vec::new();
            let mut user_parts = Vec::new();
            for message in &messages {
                let text = content_text(&message.content);
                match message.role.as_str() {
                    "system" | "developer" => system_parts.push(text),
                    "user" => user_parts.push(text),
                    other => {
                        tracing::debug!(role = other, "ignoring non-input role in input array");
                    }
                }
            }
            let system = if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n"))
            };
            (system, user_parts.join("\n"))
        }
        None => (None, String::new()),
    };

    if user_text.trim().is_empty() {
        return Err(Error::BadRequest("input must not be empty".into()));
    }
    Ok((system, UserInput::text(user_text)))
}

fn prepare(state: &AppState, tenant: &str, body: ResponsesRequest) -> Result<SessionRequest> {
    if body.model != state.config.rlm.rants_one.name {
        return Err(Error::BadRequest(format!("unknown model '{}'", body.model)));
    }
    let (system, user) = normalize_input(body.input)?;

    let previous = match &body.previous_response_id {
        Some(id) => {
            let (_, session_id) = state.store.lookup_response(id, tenant)?;
            let (_, transcript) = state.store.load_session(session_id, tenant)?;
            Some(transcript)
        }
        None => None,
    };

    Ok(SessionRequest {
        tenant_id: tenant.to_string(),
        system,
        user,
        tool_choice: body
            .tool_choice
            .as_ref()
            .and_then(|v| v.as_str())
            .map(String::from),
        temperature: body.temperature,
        max_output_tokens: body.max_output_tokens,
        previous,
        previous_response_id: body.previous_response_id,
        response_id: Some(format!("resp_{}", Uuid::new_v4().as_simple())),
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn responses(
    State(state): State<AppState>,
    Extension(Tenant(tenant)): Extension<Tenant>,
    Json(body): Json<ResponsesRequest>,
) -> Response {
    let stream = body.stream;
    let req = match prepare(&state, &tenant, body) {
        Ok(req) => req,
        Err(e) => return error_response(&e),
    };

    if stream {
        responses_stream(state, req).into_response()
    } else {
        responses_blocking(state, req).await.into_response()
    }
}

async fn responses_blocking(state: AppState, req: SessionRequest) -> Response {
    let (_session_id, mut rx, _cancel) = state.engine.clone().run(req);

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
    match completed {
        Some(response) => Json(response).into_response(),
        None => api_error(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            "session produced no response",
        ),
    }
}

fn responses_stream(state: AppState, req: SessionRequest) -> impl IntoResponse {
    let response_id = req.response_id.clone().unwrap_or_default();
    let model = state.config.rlm.rants_one.name.clone();
    let (_session_id, mut rx, _cancel) = state.engine.clone().run(req);

    let stream = async_stream::stream! {
        let mut guard = IntentGuard::new();
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::SessionStarted { .. } => {
                    yield sse_event("response.created", serde_json::json!({
                        "type": "response.created",
                        "response": {
                            "id": response_id,
                            "status": "in_progress",
                            "model": model,
                        },
                    }));
                }
                EngineEvent::TextDelta { text } => {
                    let safe = guard.push(&text);
                    if !safe.is_empty() {
                        yield sse_event("response.output_text.delta", serde_json::json!({
                            "type": "response.output_text.delta",
                            "delta": safe,
                        }));
                    }
                }
                EngineEvent::TextDone => {
                    let rest = guard.finish();
                    if !rest.is_empty() {
                        yield sse_event("response.output_text.delta", serde_json::json!({
                            "type": "response.output_text.delta",
                            "delta": rest,
                        }));
                    }
                    yield sse_event("response.output_text.done", serde_json::json!({
                        "type": "response.output_text.done",
                    }));
                }
                // Tool-phase events stay internal on this dialect. A tool
                // phase marks the end of one generation: resolving the guard
                // drops the intent line and anything trailing it, matching
                // the parsed transcript, and resets line state.
                EngineEvent::ToolPhaseStarted { .. } => {
                    let rest = guard.finish();
                    if !rest.is_empty() {
                        yield sse_event("response.output_text.delta", serde_json::json!({
                            "type": "response.output_text.delta",
                            "delta": rest,
                        }));
                    }
                }
                EngineEvent::ToolPhaseDone { .. } => {}
                EngineEvent::Completed { response } => {
                    yield sse_event("response.completed", serde_json::json!({
                        "type": "response.completed",
                        "response": response,
                    }));
                }
                EngineEvent::Failed { error } => {
                    yield sse_event("response.failed", serde_json::json!({
                        "type": "response.failed",
                        "error": error,
                    }));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(name: &str, data: serde_json::Value) -> std::result::Result<Event, Infallible> {
    Ok(Event::default().event(name).data(data.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_input_normalizes_to_user_text() {
        let (system, user) = normalize_input(Some(InputField::Text("hi".into()))).unwrap();
        assert!(system.is_none());
        assert_eq!(user.text, "hi");
    }

    #[test]
    fn message_array_splits_system_and_user() {
        let input = InputField::Messages(vec![
            InputMessage {
                role: "system".into(),
                content: serde_json::json!("be terse"),
            },
            InputMessage {
                role: "user".into(),
                content: serde_json::json!([{"type": "input_text", "text": "hello"}]),
            },
        ]);
        let (system, user) = normalize_input(Some(input)).unwrap();
        assert_eq!(system.as_deref(), Some("be terse"));
        assert_eq!(user.text, "hello");
    }

    #[test]
    fn empty_input_is_bad_request() {
        assert!(matches!(
            normalize_input(None).unwrap_err(),
            Error::BadRequest(_)
        ));
        assert!(matches!(
            normalize_input(Some(InputField::Text("   ".into()))).unwrap_err(),
            Error::BadRequest(_)
        ));
    }
}
