//! The external response object returned by `POST /v1/responses`.

use serde::{Deserialize, Serialize};

use crate::stream::Usage;

/// The wire-format response object (OpenAI Responses API shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseObject {
    /// `resp_<uuid>`.
    pub id: String,
    pub created_at: i64,
    pub model: String,
    pub output: Vec<OutputItem>,
    /// `completed` | `failed` | `cancelled`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputItem {
    #[serde(rename = "message")]
    Message {
        role: String,
        content: Vec<OutputContent>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputContent {
    #[serde(rename = "output_text")]
    OutputText { text: String },
}

impl ResponseObject {
    /// Build a completed response with a single assistant text message.
    pub fn assistant_text(
        id: String,
        created_at: i64,
        model: String,
        text: String,
        usage: Option<Usage>,
        previous_response_id: Option<String>,
    ) -> Self {
        Self {
            id,
            created_at,
            model,
            output: vec![OutputItem::Message {
                role: "assistant".into(),
                content: vec![OutputContent::OutputText { text }],
            }],
            status: "completed".into(),
            usage,
            previous_response_id,
        }
    }

    /// The concatenated assistant text across all output items.
    pub fn output_text(&self) -> String {
        let mut out = String::new();
        for item in &self.output {
            let OutputItem::Message { content, .. } = item;
            for part in content {
                let OutputContent::OutputText { text } = part;
                out.push_str(text);
            }
        }
        out
    }
}
