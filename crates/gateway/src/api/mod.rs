pub mod auth;
pub mod chat;
pub mod error;
pub mod models;
pub mod responses;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// `/health` is public; everything under `/v1` runs behind the tenant
/// admission middleware (auth + rate limit).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/health", get(models::health));

    let protected = Router::new()
        .route("/v1/responses", post(responses::responses))
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/models", get(models::list_models))
        .route_layer(middleware::from_fn_with_state(state, auth::admit));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
