use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use rants_domain::message::ToolSchema;
use rants_domain::session::tool_schema_digest;

use crate::context::{ToolContext, ToolOutcome};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor capability
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The single-method capability every tool exposes.
///
/// New tools are added by registering, not by subclassing; dispatch over
/// tool names stays a closed set owned by the session loop.
#[async_trait::async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolOutcome;
}

/// A registered tool: schema plus executor.
#[derive(Clone)]
pub struct RegisteredTool {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub schema: Value,
    pub executor: Arc<dyn ToolExecutor>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Name → tool lookup, fixed at startup.
///
/// Backed by a `BTreeMap` so schema listings (and therefore the transcript
/// digest) are deterministic.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: RegisteredTool) {
        if self.tools.contains_key(&tool.name) {
            tracing::warn!(tool = %tool.name, "re-registering tool; previous entry replaced");
        }
        self.tools.insert(tool.name.clone(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool schemas, sorted by name.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|t| ToolSchema {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.schema.clone(),
            })
            .collect()
    }

    /// Canonical digest over the schema list; recorded on each transcript.
    pub fn digest(&self) -> String {
        tool_schema_digest(&self.schemas())
    }

    /// One-line-per-tool listing for the generator system prompt.
    pub fn listing(&self) -> String {
        self.tools
            .values()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
