//! AppState construction — the composition root.
//!
//! Validates config, initializes every subsystem with a breadcrumb, and
//! returns a fully-wired [`AppState`]. Tests substitute backend doubles by
//! building the state through [`build_app_state_with_backends`].

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use rants_backend::{ModelBackend, OpenAiCompatBackend};
use rants_domain::config::{Config, ConfigSeverity};
use rants_engine::Orchestrator;
use rants_store::TranscriptStore;
use rants_tools::builtin_registry;

use crate::api::auth::TenantKeys;
use crate::rate_limit::RateLimiter;
use crate::state::AppState;

/// Validate the config and construct the full runtime with real HTTP
/// backends.
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let generator: Arc<dyn ModelBackend> = Arc::new(
        OpenAiCompatBackend::from_config("generator", &config.models.generator, &config.resilience)
            .context("initializing generator backend")?,
    );
    let compiler: Arc<dyn ModelBackend> = Arc::new(
        OpenAiCompatBackend::from_config(
            "tool_compiler",
            &config.models.tool_compiler,
            &config.resilience,
        )
        .context("initializing tool-compiler backend")?,
    );
    build_app_state_with_backends(config, generator, compiler)
}

/// The seam tests use: same wiring, injected backends.
pub fn build_app_state_with_backends(
    config: Arc<Config>,
    generator: Arc<dyn ModelBackend>,
    compiler: Arc<dyn ModelBackend>,
) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Workspace root (created, then pinned to an absolute path) ────
    std::fs::create_dir_all(&config.workspace.root).with_context(|| {
        format!(
            "creating workspace root {}",
            config.workspace.root.display()
        )
    })?;
    let workspace_root = config
        .workspace
        .root
        .canonicalize()
        .context("resolving workspace root")?;
    tracing::info!(path = %workspace_root.display(), "workspace root ready");

    // ── Transcript store ─────────────────────────────────────────────
    let store = Arc::new(
        TranscriptStore::open(&config.storage.path).context("opening transcript store")?,
    );

    // ── Tool registry ────────────────────────────────────────────────
    let registry = Arc::new(builtin_registry());
    tracing::info!(
        tools = registry.len(),
        digest = %registry.digest(),
        "tool registry ready"
    );

    if config.models.vision.is_some() {
        tracing::info!("vision backend configured (not routed by the session loop)");
    }

    // ── Engine ───────────────────────────────────────────────────────
    let engine = Orchestrator::new(
        config.clone(),
        store.clone(),
        registry,
        generator,
        compiler,
        workspace_root,
    );
    tracing::info!("session engine ready");

    // ── Rate limiter + tenants ───────────────────────────────────────
    let limiter = Arc::new(RateLimiter::from_config(&config.rate_limits));
    if config.rate_limits.enabled {
        tracing::info!(
            rpm = config.rate_limits.requests_per_minute,
            burst = config.rate_limits.burst,
            "rate limiter enabled"
        );
    }
    let tenants = Arc::new(TenantKeys::from_config(&config.auth));
    if config.auth.enabled {
        tracing::info!(keys = config.auth.api_keys.len(), "API-key auth enabled");
    } else {
        tracing::warn!("auth disabled — all requests map to the anonymous tenant");
    }

    Ok(AppState {
        config,
        store,
        engine,
        limiter,
        tenants,
        started_at: Utc::now(),
    })
}
