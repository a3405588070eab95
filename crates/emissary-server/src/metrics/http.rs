//! Per-route HTTP request counters and latency histograms.

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};
use std::time::Instant;

const REQUESTS_TOTAL: &str = "emissary_http_requests_total";
const REQUEST_DURATION: &str = "emissary_http_request_duration_seconds";

/// Label for requests no route matched.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Route template used as the `path` label: `/api/{key}` rather than
/// `/api/17`, so entity keys never become label values.
fn route_label(matched_path: Option<&MatchedPath>) -> String {
    matched_path
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string())
}

/// Counts every request by method, route and status, and records its duration.
pub async fn http_metrics_middleware(
    matched_path: Option<MatchedPath>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().as_str().to_owned();
    let route = route_label(matched_path.as_ref());

    let response = next.run(request).await;
    let elapsed = started.elapsed().as_secs_f64();

    counter!(
        REQUESTS_TOTAL,
        "method" => method.clone(),
        "path" => route.clone(),
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    histogram!(REQUEST_DURATION, "method" => method, "path" => route).record(elapsed);

    response
}

pub fn register_http_metrics() {
    metrics::describe_counter!(REQUESTS_TOTAL, "HTTP requests by method, route and status");
    metrics::describe_histogram!(
        REQUEST_DURATION,
        metrics::Unit::Seconds,
        "HTTP request handling time"
    );
}
