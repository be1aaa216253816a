//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use clip_models::QueueName;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub queue_store: CheckStatus,
    pub counter_store: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Readiness check endpoint (readiness probe).
///
/// The queue store gates readiness. The counter store is only reported:
/// rate limiting fails open without it.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let queue_store = {
        let start = Instant::now();
        let result = match state.registry.get_or_create(QueueName::Stt).await {
            Ok(queue) => queue.store().ping().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => CheckStatus::ok(elapsed_ms(start)),
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    let counter_store = {
        let start = Instant::now();
        match state.counter_store.ping().await {
            Ok(()) => CheckStatus::ok(elapsed_ms(start)),
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    let ready = queue_store.is_ok();
    let status = match (ready, counter_store.is_ok()) {
        (true, true) => "ready",
        (true, false) => "degraded",
        (false, _) => "not_ready",
    };

    let response = ReadinessResponse {
        status: status.to_string(),
        checks: ReadinessChecks {
            queue_store,
            counter_store,
        },
    };

    if ready {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
