use std::time::Instant;

use rants_domain::error::Result;
use rants_domain::message::Message;
use rants_domain::stream::{BoxStream, StreamEvent, Usage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A backend-agnostic completion request in normalized shape.
#[derive(Debug, Clone, Default)]
pub struct BackendRequest {
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// Sampling temperature. `None` lets the backend's configured
    /// parameters (or the upstream default) apply.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response.
    pub max_tokens: Option<u32>,
    /// Stop sequences.
    pub stop: Vec<String>,
    /// Model identifier override. When `None`, the backend uses its
    /// configured default.
    pub model: Option<String>,
    /// Session deadline. Requests are bounded by the smaller of this and
    /// the configured request timeout.
    pub deadline: Option<Instant>,
}

/// A non-streaming completion result.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub text: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core backend trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every upstream model adapter must implement.
///
/// The tool compiler and non-stream requests use [`complete`]; streaming
/// generator output uses [`stream`].
///
/// [`complete`]: ModelBackend::complete
/// [`stream`]: ModelBackend::stream
#[async_trait::async_trait]
pub trait ModelBackend: Send + Sync {
    /// Send a completion request and wait for the full response.
    async fn complete(&self, req: &BackendRequest) -> Result<CompletionResult>;

    /// Send a completion request and return a stream of token events.
    async fn stream(&self, req: &BackendRequest)
        -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A unique identifier for this backend instance.
    fn backend_id(&self) -> &str;
}

