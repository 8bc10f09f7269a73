//! `GET /v1/models` and `GET /health`.

use axum::extract::State;
use axum::response::Json;

use rants_domain::config::BackendConfig;

use crate::state::AppState;

/// The single configured virtual model, OpenAI list shape.
pub async fn list_models(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "object": "list",
        "data": [{
            "id": state.config.rlm.rants_one.name,
            "object": "model",
            "created": state.started_at.timestamp(),
            "owned_by": "rants",
        }],
    }))
}

/// Gateway version plus per-backend flags. Flags reflect configuration and
/// construction state; the health path never probes upstreams.
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let models = &state.config.models;
    let mut backends = serde_json::json!({
        "generator": backend_status(&models.generator),
        "tool_compiler": backend_status(&models.tool_compiler),
    });
    if let Some(vision) = &models.vision {
        backends["vision"] = backend_status(vision);
    }

    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at.to_rfc3339(),
        "backends": backends,
    }))
}

fn backend_status(cfg: &BackendConfig) -> serde_json::Value {
    let configured = !cfg.base_url.is_empty() && !cfg.model.is_empty();
    serde_json::json!({
        "configured": configured,
        "reachable": configured
            && (cfg.base_url.starts_with("http://") || cfg.base_url.starts_with("https://")),
        "base_url": cfg.base_url,
        "model": cfg.model,
    })
}
