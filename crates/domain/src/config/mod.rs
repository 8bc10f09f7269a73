mod auth;
mod env;
mod limits;
mod models;
mod rate_limits;
mod resilience;
mod rlm;
mod server;
mod storage;
mod tools;
mod workspace;

pub use auth::*;
pub use env::{apply_env_overrides, ENV_PREFIX};
pub use limits::*;
pub use models::*;
pub use rate_limits::*;
pub use resilience::*;
pub use rlm::*;
pub use server::*;
pub use storage::*;
pub use tools::*;
pub use workspace::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub rlm: RlmConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Load `config.yaml` from `path` and apply `RANTS_*` environment
    /// overrides on top.
    pub fn load(path: &Path) -> Result<Config> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_yaml(&raw, std::env::vars())
    }

    /// Parse a YAML document and apply overrides from `vars`.
    pub fn from_yaml(raw: &str, vars: impl Iterator<Item = (String, String)>) -> Result<Config> {
        let mut value: serde_yaml::Value =
            serde_yaml::from_str(raw).map_err(|e| Error::Config(format!("parsing YAML: {e}")))?;
        if value.is_null() {
            value = serde_yaml::Value::Mapping(Default::default());
        }
        apply_env_overrides(&mut value, vars);
        serde_yaml::from_value(value).map_err(|e| Error::Config(format!("invalid config: {e}")))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(err("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(err("server.host", "host must not be empty"));
        }

        if self.rlm.rants_one.name.is_empty() {
            errors.push(err("rlm.rants_one.name", "virtual model name must not be empty"));
        }
        if self.limits.max_tool_iterations == 0 {
            errors.push(err(
                "limits.max_tool_iterations",
                "must be greater than 0",
            ));
        }
        if self.limits.max_wallclock_seconds == 0 {
            errors.push(err(
                "limits.max_wallclock_seconds",
                "must be greater than 0",
            ));
        }

        validate_backend(&mut errors, "models.generator", &self.models.generator);
        validate_backend(&mut errors, "models.tool_compiler", &self.models.tool_compiler);
        if let Some(vision) = &self.models.vision {
            validate_backend(&mut errors, "models.vision", vision);
        }

        if self.auth.enabled && self.auth.api_keys.is_empty() {
            errors.push(err(
                "auth.api_keys",
                "auth is enabled but no API keys are configured",
            ));
        }
        for (i, entry) in self.auth.api_keys.iter().enumerate() {
            if entry.key.is_empty() {
                errors.push(err(&format!("auth.api_keys[{i}].key"), "key must not be empty"));
            }
            if entry.tenant_id.is_empty() {
                errors.push(err(
                    &format!("auth.api_keys[{i}].tenant_id"),
                    "tenant_id must not be empty",
                ));
            }
        }

        if self.rate_limits.enabled {
            if self.rate_limits.requests_per_minute == 0 {
                errors.push(err(
                    "rate_limits.requests_per_minute",
                    "must be greater than 0",
                ));
            }
            if self.rate_limits.burst == 0 {
                errors.push(err("rate_limits.burst", "must be greater than 0"));
            }
        }

        if self.resilience.backoff_seconds < 0.0 {
            errors.push(err("resilience.backoff_seconds", "must not be negative"));
        }
        if self.resilience.request_timeout_seconds == 0 {
            errors.push(err(
                "resilience.request_timeout_seconds",
                "must be greater than 0",
            ));
        }

        if self.storage.path.as_os_str().is_empty() {
            errors.push(err("storage.path", "path must not be empty"));
        }
        if self.workspace.root.as_os_str().is_empty() {
            errors.push(err("workspace.root", "root must not be empty"));
        }
        if self.tools.max_output_bytes == 0 {
            errors.push(err("tools.max_output_bytes", "must be greater than 0"));
        }

        errors
    }
}

fn validate_backend(errors: &mut Vec<ConfigError>, field: &str, cfg: &BackendConfig) {
    if cfg.base_url.is_empty() {
        errors.push(err(&format!("{field}.base_url"), "base_url must not be empty"));
    } else if !cfg.base_url.starts_with("http://") && !cfg.base_url.starts_with("https://") {
        errors.push(err(
            &format!("{field}.base_url"),
            &format!(
                "base_url must start with http:// or https:// (got \"{}\")",
                cfg.base_url
            ),
        ));
    }
    if cfg.model.is_empty() {
        errors.push(err(&format!("{field}.model"), "model must not be empty"));
    }
    if cfg.provider != "openai_compat" {
        errors.push(ConfigError {
            severity: ConfigSeverity::Warning,
            field: format!("{field}.provider"),
            message: format!("unknown provider \"{}\" — treated as openai_compat", cfg.provider),
        });
    }
}

fn err(field: &str, message: &str) -> ConfigError {
    ConfigError {
        severity: ConfigSeverity::Error,
        field: field.into(),
        message: message.into(),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: build a minimal valid Config.
    fn valid_config() -> Config {
        let mut cfg = Config::default();
        cfg.models.generator.base_url = "http://localhost:11434/v1".into();
        cfg.models.generator.model = "qwen2.5-7b".into();
        cfg.models.tool_compiler.base_url = "http://localhost:11434/v1".into();
        cfg.models.tool_compiler.model = "qwen2.5-coder-1.5b".into();
        cfg
    }

    /// Helper: find the first issue matching a field prefix.
    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_passes() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.port").expect("expected server.port error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn generator_base_url_scheme_is_checked() {
        let mut cfg = valid_config();
        cfg.models.generator.base_url = "ftp://nope".into();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "models.generator.base_url").expect("expected error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
        assert!(issue.message.contains("http://"));
    }

    #[test]
    fn compiler_model_empty_is_error() {
        let mut cfg = valid_config();
        cfg.models.tool_compiler.model = String::new();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "models.tool_compiler.model").is_some());
    }

    #[test]
    fn auth_enabled_without_keys_is_error() {
        let mut cfg = valid_config();
        cfg.auth.enabled = true;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "auth.api_keys").expect("expected auth error");
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn rate_limits_zero_rpm_is_error_when_enabled() {
        let mut cfg = valid_config();
        cfg.rate_limits.enabled = true;
        cfg.rate_limits.requests_per_minute = 0;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "rate_limits.requests_per_minute").is_some());
    }

    #[test]
    fn rate_limits_zero_values_ok_when_disabled() {
        let mut cfg = valid_config();
        cfg.rate_limits.enabled = false;
        cfg.rate_limits.requests_per_minute = 0;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "rate_limits").is_none());
    }

    #[test]
    fn unknown_provider_is_warning() {
        let mut cfg = valid_config();
        cfg.models.generator.provider = "mystery".into();
        let issues = cfg.validate();
        let issue = find_issue(&issues, "models.generator.provider").expect("expected warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let cfg = Config::from_yaml("", std::iter::empty()).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.rlm.rants_one.name, "rants-one");
        assert_eq!(cfg.limits.max_tool_iterations, 8);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let cfg = Config::from_yaml(
            "server:\n  port: 1234\n  frobnicate: yes\nnot_a_section: {}\n",
            std::iter::empty(),
        )
        .unwrap();
        assert_eq!(cfg.server.port, 1234);
    }

    #[test]
    fn env_override_wins_over_file() {
        let vars = vec![("RANTS_SERVER__PORT".to_string(), "9090".to_string())];
        let cfg = Config::from_yaml("server:\n  port: 1234\n", vars.into_iter()).unwrap();
        assert_eq!(cfg.server.port, 9090);
    }

    #[test]
    fn env_override_populates_api_keys() {
        let vars = vec![
            ("RANTS_AUTH__ENABLED".to_string(), "true".to_string()),
            ("RANTS_AUTH__API_KEYS__0__KEY".to_string(), "sk-x".to_string()),
            (
                "RANTS_AUTH__API_KEYS__0__TENANT_ID".to_string(),
                "acme".to_string(),
            ),
        ];
        let cfg = Config::from_yaml("", vars.into_iter()).unwrap();
        assert!(cfg.auth.enabled);
        assert_eq!(cfg.auth.api_keys.len(), 1);
        assert_eq!(cfg.auth.api_keys[0].tenant_id, "acme");
    }

    #[test]
    fn config_error_display_format() {
        let e = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(format!("{e}"), "[ERROR] server.port: port must be greater than 0");
    }
}
