//! # Admin-Surface Middleware
//!
//! The optional admin/status router (§10, `server.rs`) carries the same
//! ambient logging/metrics shape as the teacher's middleware stack, trimmed
//! to what a status surface needs: no auth, no CORS, no plugin hooks — this
//! is an operator-facing introspection endpoint, not the gateway's request
//! path.

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

use crate::server::AppState;

/// Logs method/uri/status/latency for every admin-surface request.
pub async fn logging_middleware(
    State(_state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_id = uuid::Uuid::new_v4().to_string();

    let response = next.run(req).await;

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        latency_ms = start.elapsed().as_millis(),
        "admin request processed"
    );

    response
}

/// Feeds admin-surface request latency into the same rolling metrics the
/// execution backends report through, tagged under a synthetic handler key
/// so `/metrics` shows both plugin invocation and admin-surface traffic.
pub async fn metrics_middleware(
    State(_state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;
    let duration = start.elapsed();
    let ok = response.status().is_success();

    crate::metrics::record_invocation("_admin", &path, duration, ok).await;

    response
}
