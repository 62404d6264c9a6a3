//! HTTP metrics middleware.
//!
//! Records every response, including those produced before a handler runs:
//! - 400/422 for gateway events that fail to deserialize
//! - 415 for requests without a JSON content type
//! - 404/405 for unknown routes and methods

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::metrics::record_http_request;

/// Middleware that records method, normalized path, status and duration.
///
/// Applied as the outermost layer.
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed());

    response
}
