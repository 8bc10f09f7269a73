//! Error → HTTP mapping for the OpenAI-compatible surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use rants_domain::error::Error;
use rants_domain::stream::EngineError;

/// Build a standard OpenAI-style error body: `{"error": {...}}`.
pub fn error_body(error_type: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "message": message,
            "type": error_type,
        }
    })
}

pub fn api_error(status: StatusCode, error_type: &str, message: &str) -> Response {
    (status, Json(error_body(error_type, message))).into_response()
}

/// Map a transport-level [`Error`] (request validation, store lookups)
/// to a response.
pub fn error_response(err: &Error) -> Response {
    match err {
        Error::BadRequest(msg) => api_error(StatusCode::BAD_REQUEST, "invalid_request_error", msg),
        Error::NotFound(msg) => api_error(StatusCode::NOT_FOUND, "not_found_error", msg),
        Error::RateLimited { retry_after_secs } => {
            let mut resp = api_error(
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_error",
                "rate limit exceeded",
            );
            if let Ok(value) = retry_after_secs.to_string().parse() {
                resp.headers_mut().insert("Retry-After", value);
            }
            resp
        }
        other => {
            let engine = EngineError::from_error(other);
            engine_error_response(&engine)
        }
    }
}

/// Map a terminal engine failure to a response. Upstream and compiler
/// failures are 502, deadline is 504, everything else 500 with an opaque
/// message (full detail is logged server-side).
pub fn engine_error_response(err: &EngineError) -> Response {
    let status = match err.kind.as_str() {
        "upstream_error" | "tool_compile_error" => StatusCode::BAD_GATEWAY,
        "deadline_exceeded" => StatusCode::GATEWAY_TIMEOUT,
        "cancelled" => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let error_type = match status {
        StatusCode::BAD_GATEWAY => "upstream_error",
        StatusCode::GATEWAY_TIMEOUT => "timeout_error",
        _ => "server_error",
    };
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        "internal server error".to_string()
    } else {
        err.message.clone()
    };
    api_error(status, error_type, &message)
}
