//! The tool compiler: a dedicated deterministic model turns plain-English
//! tool intent plus schemas and compact context into a validated
//! `tool_calls` array.
//!
//! Parsing is tolerant (raw body, a single code fence, or the first balanced
//! JSON object), validation is strict (registry lookup + JSON Schema), and
//! exactly one repair attempt re-invokes the backend with the prior output
//! and the specific validation error. Raw compiler output never leaves this
//! module except inside audit/log detail.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use rants_backend::{BackendRequest, ModelBackend};
use rants_domain::error::{Error, Result};
use rants_domain::message::{Message, ToolCall};
use rants_tools::ToolRegistry;

const COMPILER_SYSTEM_PROMPT: &str = r#"Return JSON only. Schema: {"tool_calls": [{"tool": <name>, "parameters": <object>}, ...]}. No prose, no code fences."#;

pub struct ToolCompiler {
    backend: Arc<dyn ModelBackend>,
}

impl ToolCompiler {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    /// Compile an intent into validated tool calls.
    ///
    /// On parse or validation failure the backend is re-invoked once with
    /// the prior output and the specific error; a second failure is
    /// *ToolCompileError*.
    pub async fn compile(
        &self,
        registry: &ToolRegistry,
        compact_context: &str,
        intent: &str,
        deadline: Option<Instant>,
    ) -> Result<Vec<ToolCall>> {
        let user = build_user_message(registry, compact_context, intent);
        let mut messages = vec![
            Message::system(COMPILER_SYSTEM_PROMPT),
            Message::user(user),
        ];

        let first = self.invoke(&messages, deadline).await?;
        let problem = match parse_and_validate(&first, registry) {
            Ok(calls) => return Ok(calls),
            Err(problem) => problem,
        };

        tracing::warn!(error = %problem, "tool compilation invalid, attempting repair");
        messages.push(Message::assistant(first));
        messages.push(Message::user(format!(
            "Your previous output was invalid: {problem}\nReturn corrected JSON only."
        )));

        let second = self.invoke(&messages, deadline).await?;
        parse_and_validate(&second, registry).map_err(Error::ToolCompile)
    }

    async fn invoke(&self, messages: &[Message], deadline: Option<Instant>) -> Result<String> {
        let req = BackendRequest {
            messages: messages.to_vec(),
            temperature: Some(0.0),
            deadline,
            ..BackendRequest::default()
        };
        let result = self.backend.complete(&req).await?;
        Ok(result.text)
    }
}

fn build_user_message(registry: &ToolRegistry, compact_context: &str, intent: &str) -> String {
    let schemas = serde_json::to_string_pretty(&registry.schemas()).unwrap_or_default();
    format!("Tool schemas:\n{schemas}\n\nContext:\n{compact_context}\n\nIntent: {intent}")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Accept the raw body, the contents of a single top-level code fence, or
/// the first balanced JSON object.
fn extract_json(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();

    if let Ok(v) = serde_json::from_str(trimmed) {
        return Some(v);
    }
    if let Some(inner) = strip_code_fence(trimmed) {
        if let Ok(v) = serde_json::from_str(inner.trim()) {
            return Some(v);
        }
    }
    first_balanced_object(trimmed).and_then(|s| serde_json::from_str(s).ok())
}

fn strip_code_fence(s: &str) -> Option<&str> {
    let rest = s.strip_prefix("```")?;
    // Skip an optional language tag on the opening line.
    let body_start = rest.find('\n')? + 1;
    let body = &rest[body_start..];
    let end = body.rfind("```")?;
    Some(&body[..end])
}

/// Scan for the first `{`-balanced span, respecting strings and escapes.
fn first_balanced_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_and_validate(
    raw: &str,
    registry: &ToolRegistry,
) -> std::result::Result<Vec<ToolCall>, String> {
    let value =
        extract_json(raw).ok_or_else(|| "output is not a JSON object".to_string())?;

    let calls = value
        .get("tool_calls")
        .ok_or_else(|| "missing top-level \"tool_calls\" array".to_string())?
        .as_array()
        .ok_or_else(|| "\"tool_calls\" must be an array".to_string())?;

    let mut validated = Vec::with_capacity(calls.len());
    for (i, entry) in calls.iter().enumerate() {
        let tool = entry
            .get("tool")
            .and_then(|v| v.as_str())
            .ok_or_else(|| format!("tool_calls[{i}] is missing a \"tool\" name"))?;

        let registered = registry
            .get(tool)
            .ok_or_else(|| format!("tool_calls[{i}]: unknown tool \"{tool}\""))?;

        let parameters = entry
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));

        let schema = jsonschema::JSONSchema::compile(&registered.schema)
            .map_err(|e| format!("tool \"{tool}\" has an uncompilable schema: {e}"))?;
        if let Err(errors) = schema.validate(&parameters) {
            let detail = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(format!(
                "tool_calls[{i}] ({tool}): parameters do not match the schema: {detail}"
            ));
        }

        validated.push(ToolCall {
            id: Uuid::new_v4(),
            tool: tool.to_string(),
            parameters,
        });
    }

    Ok(validated)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
