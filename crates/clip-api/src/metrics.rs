//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "clip_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "clip_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "clip_http_requests_in_flight";

    // Rate limiting metrics
    pub const RATE_LIMIT_DENIED_TOTAL: &str = "clip_rate_limit_denied_total";
    pub const RATE_LIMIT_FAIL_OPEN_TOTAL: &str = "clip_rate_limit_fail_open_total";

    // BYOK cache metrics
    pub const BYOK_CACHE_MISSES_TOTAL: &str = "clip_byok_cache_misses_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a call denied by the rate limiter.
pub fn record_rate_limit_denied(scope: &str) {
    let labels = [("scope", scope.to_string())];
    counter!(names::RATE_LIMIT_DENIED_TOTAL, &labels).increment(1);
}

/// Record a call let through because the counter store was unavailable.
pub fn record_rate_limit_fail_open(scope: &str) {
    let labels = [("scope", scope.to_string())];
    counter!(names::RATE_LIMIT_FAIL_OPEN_TOTAL, &labels).increment(1);
}

/// Record a BYOK key that could not be read back.
pub fn record_byok_cache_miss(provider: &str) {
    let labels = [("provider", provider.to_string())];
    counter!(names::BYOK_CACHE_MISSES_TOTAL, &labels).increment(1);
}

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("valid regex")
});
static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/[0-9]+(/|$)").expect("valid regex")
});
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(videos|clips|publications)/[a-zA-Z0-9_.:-]+")
        .expect("valid regex")
});

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    let path = UUID_RE.replace_all(path, ":id");
    let path = NUMERIC_RE.replace_all(&path, "/:id$1");
    let path = ENTITY_RE.replace_all(&path, "/$1/:id");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
