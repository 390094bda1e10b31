//! services/api/src/web/middleware.rs
//!
//! Shared-secret protection for the mutating routes, and request logging.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::web::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Middleware that checks the `X-Api-Key` header against the configured secret.
///
/// When no secret is configured every request passes.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(secret) = state.config.shared_secret.as_deref() {
        let presented = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(secret) {
            warn!(path = %req.uri().path(), "Rejected request with a missing or wrong API key");
            return Err(ApiError::Unauthorized);
        }
    }

    Ok(next.run(req).await)
}

/// Logs method, path, status and latency of every request except health probes.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    if path.starts_with("/api/health") {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let started = Instant::now();
    let response = next.run(req).await;
    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "Handled request"
    );
    response
}
