//! Tenant resolution and admission.
//!
//! API keys are hashed once at startup; request keys are hashed and compared
//! in constant time. When auth is disabled every request resolves to the
//! `"anonymous"` tenant. The same middleware applies the per-tenant rate
//! limit so handlers always run with an admitted tenant in extensions.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use rants_domain::config::{AuthConfig, ANONYMOUS_TENANT};
use rants_domain::error::Error;

use crate::api::error::{api_error, error_response};
use crate::state::AppState;

/// The tenant resolved for this request, injected into extensions.
#[derive(Debug, Clone)]
pub struct Tenant(pub String);

/// Startup-hashed key → tenant table.
pub struct TenantKeys {
    enabled: bool,
    keys: Vec<(Vec<u8>, String)>,
}

impl TenantKeys {
    pub fn from_config(cfg: &AuthConfig) -> Self {
        let keys = cfg
            .api_keys
            .iter()
            .map(|entry| {
                (
                    Sha256::digest(entry.key.as_bytes()).to_vec(),
                    entry.tenant_id.clone(),
                )
            })
            .collect();
        Self {
            enabled: cfg.enabled,
            keys,
        }
    }

    /// Resolve a bearer token to a tenant. `None` means rejected.
    pub fn resolve(&self, bearer: Option<&str>) -> Option<String> {
        if !self.enabled {
            return Some(ANONYMOUS_TENANT.to_string());
        }
        let provided = Sha256::digest(bearer.unwrap_or("").as_bytes());
        // Scan every entry so timing does not reveal which key matched.
        let mut matched: Option<&str> = None;
        for (digest, tenant) in &self.keys {
            if bool::from(provided.ct_eq(digest.as_slice())) {
                matched = Some(tenant);
            }
        }
        matched.map(String::from)
    }
}

/// Axum middleware: resolve the tenant, apply the rate limit, stash the
/// tenant in request extensions.
pub async fn admit(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let bearer = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let tenant = match state.tenants.resolve(bearer) {
        Some(tenant) => tenant,
        None => {
            return api_error(
                StatusCode::UNAUTHORIZED,
                "invalid_request_error",
                "invalid or missing API key",
            )
        }
    };

    if let Err(retry_after_secs) = state.limiter.try_acquire(&tenant) {
        return error_response(&Error::RateLimited { retry_after_secs });
    }

    req.extensions_mut().insert(Tenant(tenant));
    next.run(req).await.into_response()
}
