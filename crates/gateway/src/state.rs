use std::sync::Arc;

use chrono::{DateTime, Utc};

use rants_domain::config::Config;
use rants_engine::Orchestrator;
use rants_store::TranscriptStore;

use crate::api::auth::TenantKeys;
use crate::rate_limit::RateLimiter;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<TranscriptStore>,
    /// The recursive session engine.
    pub engine: Arc<Orchestrator>,
    /// Per-tenant token buckets.
    pub limiter: Arc<RateLimiter>,
    /// API-key → tenant resolution (hashed at startup).
    pub tenants: Arc<TenantKeys>,
    pub started_at: DateTime<Utc>,
}
