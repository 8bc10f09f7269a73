//! Recursive sessions and canonical transcripts.
//!
//! A session is one orchestration instance: its own transcript, depth, and
//! deadline. Sessions form a tree through `parent_id` only — children never
//! hold a strong reference to an ancestor; the store resolves ids on lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::message::{ContentPart, ToolCall, ToolResult, ToolSchema};

/// The unit of orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecursiveSession {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub tenant_id: String,
    /// 0 for a root session, `parent.depth + 1` otherwise.
    pub depth: u32,
    pub created_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SessionStatus::Running),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }
}

/// The normalized initial user input: plain text plus any structured parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInput {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<ContentPart>,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parts: Vec::new(),
        }
    }
}

/// The session's context C: system + user + ordered steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalTranscript {
    pub system: Option<String>,
    pub user: UserInput,
    /// SHA-256 over the canonical JSON encoding of the tool-schema list
    /// visible to this session; must match across steps.
    pub tool_schema_digest: String,
    pub steps: Vec<Step>,
}

impl CanonicalTranscript {
    pub fn new(system: Option<String>, user: UserInput, tool_schema_digest: String) -> Self {
        Self {
            system,
            user,
            tool_schema_digest,
            steps: Vec::new(),
        }
    }
}

/// One generation cycle.
///
/// Invariants once finalized: `tool_calls.len() == tool_results.len()`, and
/// both are empty when `tool_intent` is `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// User-visible text (may be empty).
    pub generator_output: String,
    pub tool_intent: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Step {
    pub fn started(started_at: DateTime<Utc>) -> Self {
        Self {
            generator_output: String::new(),
            tool_intent: None,
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            started_at,
            finished_at: None,
        }
    }
}

/// Append-only audit record, one per tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub tenant_id: String,
    pub session_id: Uuid,
    pub step_index: u32,
    pub call_id: Uuid,
    pub tool: String,
    pub ok: bool,
    pub error_kind: Option<crate::error::ToolErrorKind>,
    pub timestamp: DateTime<Utc>,
    pub size_before: u64,
    pub size_after: u64,
}

/// Compute the canonical digest of a tool-schema list.
///
/// Schemas are serialized in the order given (registries expose them sorted
/// by name); `serde_json` maps are key-ordered, so the encoding is stable.
pub fn tool_schema_digest(schemas: &[ToolSchema]) -> String {
    let encoded = serde_json::to_string(schemas).unwrap_or_default();
    let digest = Sha256::digest(encoded.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(name: &str) -> ToolSchema {
        ToolSchema {
            name: name.into(),
            description: format!("{name} tool"),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    #[test]
    fn digest_is_stable_for_identical_lists() {
        let a = vec![schema("bash"), schema("read")];
        let b = vec![schema("bash"), schema("read")];
        assert_eq!(tool_schema_digest(&a), tool_schema_digest(&b));
    }

    #[test]
    fn digest_changes_with_schema_content() {
        let a = vec![schema("bash")];
        let mut b = vec![schema("bash")];
        b[0].parameters = json!({"type": "object", "properties": {"x": {"type": "string"}}});
        assert_ne!(tool_schema_digest(&a), tool_schema_digest(&b));
    }

    #[test]
    fn digest_is_hex_sha256() {
        let d = tool_schema_digest(&[schema("bash")]);
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn session_status_round_trips() {
        for s in [
            SessionStatus::Running,
            SessionStatus::Completed,
            SessionStatus::Failed,
            SessionStatus::Cancelled,
        ] {
            assert_eq!(SessionStatus::parse(s.as_str()), Some(s));
        }
    }
}
