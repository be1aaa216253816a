//! Queue inspection handlers.

use axum::extract::{Path, State};
use axum::Json;
use clip_models::QueueName;
use clip_queue::JobCounts;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct QueueCountsResponse {
    pub queue: QueueName,
    pub counts: JobCounts,
}

/// GET /api/queues/:queue/counts
pub async fn queue_counts(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(queue): Path<String>,
) -> ApiResult<Json<QueueCountsResponse>> {
    let queue: QueueName = queue
        .parse()
        .map_err(|_| ApiError::not_found(format!("Unknown queue: {queue}")))?;

    let handle = state.registry.get_or_create(queue).await?;
    let counts = handle.store().counts().await?;

    Ok(Json(QueueCountsResponse { queue, counts }))
}
