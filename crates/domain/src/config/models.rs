use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub generator: BackendConfig,
    #[serde(default)]
    pub tool_compiler: BackendConfig,
    /// Optional vision backend. Accepted by the config schema; the session
    /// loop does not route to it.
    #[serde(default)]
    pub vision: Option<BackendConfig>,
}

/// One upstream OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "d_provider")]
    pub provider: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Extra request parameters merged into the JSON body (e.g.
    /// `temperature`, `top_p`). Per-request fields win over these.
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    /// Environment variable holding the API key for this backend, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: d_provider(),
            base_url: String::new(),
            model: String::new(),
            capabilities: Vec::new(),
            parameters: HashMap::new(),
            api_key_env: None,
        }
    }
}

fn d_provider() -> String {
    "openai_compat".into()
}
