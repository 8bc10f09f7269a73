//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, and any other endpoint that
//! follows the OpenAI chat completions contract. The RANTS generator
//! contract is text-only, so the adapter never sends tool definitions and
//! the delta parser handles content, finish, and usage chunks only.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use rants_domain::config::{BackendConfig, ResilienceConfig};
use rants_domain::error::{Error, Result};
use rants_domain::message::{Message, Role};
use rants_domain::stream::{BoxStream, StreamEvent, Usage};

use crate::retry::{backoff_delay, is_retryable_status};
use crate::sse::sse_response_stream;
use crate::traits::{BackendRequest, CompletionResult, ModelBackend};

/// Longest upstream body excerpt attached to an error.
const BODY_EXCERPT_BYTES: usize = 512;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatBackend {
    id: String,
    base_url: String,
    default_model: String,
    api_key: Option<String>,
    extra_params: HashMap<String, Value>,
    resilience: ResilienceConfig,
    client: reqwest::Client,
}

impl OpenAiCompatBackend {
    /// Create a backend from its config section.
    ///
    /// The API key, if any, is read once from the environment variable named
    /// by `api_key_env`.
    pub fn from_config(id: &str, cfg: &BackendConfig, resilience: &ResilienceConfig) -> Result<Self> {
        let api_key = match &cfg.api_key_env {
            Some(var) => match std::env::var(var) {
                Ok(v) if !v.is_empty() => Some(v),
                _ => {
                    tracing::warn!(backend = id, env = %var, "API key env var not set; sending unauthenticated requests");
                    None
                }
            },
            None => None,
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(resilience.request_timeout_seconds))
            .build()
            .map_err(|e| Error::Internal(format!("building HTTP client: {e}")))?;

        Ok(Self {
            id: id.to_string(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            default_model: cfg.model.clone(),
            api_key,
            extra_params: cfg.parameters.clone(),
            resilience: resilience.clone(),
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body(&self, req: &BackendRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_wire).collect();

        let mut body = serde_json::json!({
            "model": req.model.clone().unwrap_or_else(|| self.default_model.clone()),
            "messages": messages,
            "stream": stream,
        });

        // Configured parameters first; explicit request fields win.
        for (key, value) in &self.extra_params {
            body[key.as_str()] = value.clone();
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if !req.stop.is_empty() {
            body["stop"] = serde_json::json!(req.stop);
        }
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        body
    }

    /// Time left until the request deadline, or `None` when unbounded.
    /// An already-expired deadline is *DeadlineExceeded*.
    fn remaining(req: &BackendRequest) -> Result<Option<Duration>> {
        match req.deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(Error::DeadlineExceeded);
                }
                Ok(Some(deadline - now))
            }
            None => Ok(None),
        }
    }

    /// POST with retries: connection errors and retryable statuses back off
    /// and retry up to `max_retries`; everything else fails immediately with
    /// the upstream status and a body excerpt.
    async fn send_with_retry(&self, body: &Value, deadline: Option<Instant>) -> Result<reqwest::Response> {
        let url = self.chat_url();
        let mut attempt: u32 = 0;

        loop {
            if let Some(d) = deadline {
                if Instant::now() >= d {
                    return Err(Error::DeadlineExceeded);
                }
            }

            let mut builder = self
                .client
                .post(&url)
                .header("Content-Type", "application/json");
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }

            match builder.json(body).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let text = resp.text().await.unwrap_or_default();
                    if is_retryable_status(status) && attempt < self.resilience.max_retries {
                        let delay = backoff_delay(attempt, self.resilience.backoff_seconds);
                        tracing::warn!(
                            backend = %self.id,
                            status,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retryable upstream status, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::Upstream {
                        status: Some(status),
                        message: excerpt(&text),
                    });
                }
                Err(e) => {
                    if (e.is_connect() || e.is_timeout()) && attempt < self.resilience.max_retries {
                        let delay = backoff_delay(attempt, self.resilience.backoff_seconds);
                        tracing::warn!(
                            backend = %self.id,
                            error = %e,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "upstream request failed, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(Error::Upstream {
                        status: e.status().map(|s| s.as_u16()),
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_wire(msg: &Message) -> Value {
    serde_json::json!({
        "role": role_to_str(msg.role),
        "content": msg.content.extract_all_text(),
    })
}

fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT_BYTES {
        return body.to_string();
    }
    let mut end = BODY_EXCERPT_BYTES;
    while end < body.len() && !body.is_char_boundary(end) {
        end += 1;
    }
    format!("{}…", &body[..end])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_completion(body: &Value) -> Result<CompletionResult> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Upstream {
            status: None,
            message: "no choices in response".into(),
        })?;

    let text = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let usage = body.get("usage").and_then(parse_usage);

    Ok(CompletionResult {
        text,
        usage,
        finish_reason,
    })
}

fn parse_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE chunk parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_sse_data(data: &str) -> Vec<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return vec![Ok(StreamEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        })];
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    let choice = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first());

    // Usage-only chunk (stream_options.include_usage).
    let Some(choice) = choice else {
        if let Some(usage) = v.get("usage").and_then(parse_usage) {
            return vec![Ok(StreamEvent::Done {
                usage: Some(usage),
                finish_reason: None,
            })];
        }
        return Vec::new();
    };

    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        let usage = v.get("usage").and_then(parse_usage);
        return vec![Ok(StreamEvent::Done {
            usage,
            finish_reason: Some(fr.to_string()),
        })];
    }

    if let Some(text) = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(|v| v.as_str())
    {
        if !text.is_empty() {
            return vec![Ok(StreamEvent::Token {
                text: text.to_string(),
            })];
        }
    }

    Vec::new()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ModelBackend for OpenAiCompatBackend {
    async fn complete(&self, req: &BackendRequest) -> Result<CompletionResult> {
        let remaining = Self::remaining(req)?;
        let body = self.build_body(req, false);

        tracing::debug!(backend = %self.id, url = %self.chat_url(), "completion request");

        let send = self.send_with_retry(&body, req.deadline);
        let resp = match remaining {
            Some(budget) => tokio::time::timeout(budget, send)
                .await
                .map_err(|_| Error::DeadlineExceeded)??,
            None => send.await?,
        };

        let text = resp.text().await.map_err(|e| Error::Upstream {
            status: None,
            message: format!("reading response body: {e}"),
        })?;
        let json: Value = serde_json::from_str(&text)?;
        parse_completion(&json)
    }

    async fn stream(
        &self,
        req: &BackendRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let remaining = Self::remaining(req)?;
        let body = self.build_body(req, true);

        tracing::debug!(backend = %self.id, url = %self.chat_url(), "stream request");

        let send = self.send_with_retry(&body, req.deadline);
        let resp = match remaining {
            Some(budget) => tokio::time::timeout(budget, send)
                .await
                .map_err(|_| Error::DeadlineExceeded)??,
            None => send.await?,
        };

        Ok(sse_response_stream(resp, parse_sse_data))
    }

    fn backend_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend() -> OpenAiCompatBackend {
        let cfg = BackendConfig {
            base_url: "http://localhost:11434/v1/".into(),
            model: "test-model".into(),
            parameters: HashMap::from([("top_p".to_string(), json!(0.9))]),
            ..BackendConfig::default()
        };
        OpenAiCompatBackend::from_config("generator", &cfg, &ResilienceConfig::default()).unwrap()
    }

    #[test]
    fn chat_url_strips_trailing_slash() {
        assert_eq!(backend().chat_url(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn body_carries_model_and_extra_params() {
        let req = BackendRequest {
            messages: vec![Message::user("hi")],
            ..BackendRequest::default()
        };
        let body = backend().build_body(&req, false);
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["top_p"], json!(0.9));
        assert_eq!(body["stream"], json!(false));
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn request_fields_override_extra_params() {
        let req = BackendRequest {
            messages: vec![Message::user("hi")],
            temperature: Some(0.0),
            max_tokens: Some(64),
            stop: vec!["\n\n".into()],
            model: Some("override".into()),
            ..BackendRequest::default()
        };
        let body = backend().build_body(&req, true);
        assert_eq!(body["model"], "override");
        assert_eq!(body["temperature"], json!(0.0));
        assert_eq!(body["max_tokens"], json!(64));
        assert_eq!(body["stop"][0], "\n\n");
        assert_eq!(body["stream_options"]["include_usage"], json!(true));
    }

    #[test]
    fn parse_completion_extracts_fields() {
        let body = json!({
            "choices": [{"message": {"content": "Hello world."}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7},
        });
        let result = parse_completion(&body).unwrap();
        assert_eq!(result.text, "Hello world.");
        assert_eq!(result.finish_reason.as_deref(), Some("stop"));
        assert_eq!(result.usage.unwrap().total_tokens, 7);
    }

    #[test]
    fn parse_completion_no_choices_is_upstream_error() {
        let err = parse_completion(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, Error::Upstream { .. }));
    }

    #[test]
    fn sse_content_delta_parses_to_token() {
        let events = parse_sse_data(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::Token { text } if text == "Hi"
        ));
    }

    #[test]
    fn sse_done_sentinel_parses() {
        let events = parse_sse_data("[DONE]");
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::Done { .. }
        ));
    }

    #[test]
    fn sse_finish_reason_parses_to_done() {
        let events =
            parse_sse_data(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::Done { finish_reason: Some(fr), .. } if fr == "stop"
        ));
    }

    #[test]
    fn sse_usage_only_chunk_parses() {
        let events = parse_sse_data(
            r#"{"choices":[],"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#,
        );
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::Done { usage: Some(u), .. } if u.total_tokens == 3
        ));
    }

    #[test]
    fn excerpt_bounds_long_bodies() {
        let long = "x".repeat(2000);
        let cut = excerpt(&long);
        assert!(cut.len() < 600);
        assert!(cut.ends_with('…'));
    }
}
