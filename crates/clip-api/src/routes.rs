//! API routes.

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    byok_status, cache_byok_keys, cancel_publication, cancel_video, check_rate_limit,
    clear_byok_keys, health, publish_clip, queue_counts, ready, transcribe_video,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let video_routes = Router::new()
        .route("/videos/:video_id/transcribe", post(transcribe_video))
        .route("/videos/:video_id/cancel", post(cancel_video));

    let publication_routes = Router::new()
        .route("/clips/:clip_id/publications", post(publish_clip))
        .route("/publications/:publication_id", delete(cancel_publication));

    let control_routes = Router::new()
        .route("/queues/:queue/counts", get(queue_counts))
        .route("/rate-limits/check", post(check_rate_limit))
        .route(
            "/byok",
            get(byok_status).put(cache_byok_keys).delete(clear_byok_keys),
        );

    let api_routes = Router::new()
        .merge(video_routes)
        .merge(publication_routes)
        .merge(control_routes);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
