//! Video pipeline handlers.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use clip_llm::ByokProvider;
use clip_models::{JobPayload, Strategy, SttJob, VideoId};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::{byok_keys_from, validate_path_id, EnqueuedResponse};
use crate::rate_limit::RateLimitRule;
use crate::state::AppState;

/// Start processing an uploaded video.
#[derive(Debug, Deserialize, Validate)]
pub struct TranscribeRequest {
    #[validate(length(min = 1, max = 1024))]
    pub source_file_path: String,
    pub strategy: Strategy,
    #[validate(length(min = 2, max = 8))]
    pub language: Option<String>,
    /// BYOK keys to cache for the rest of the pipeline run
    #[serde(default)]
    pub byok_keys: HashMap<ByokProvider, String>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: usize,
}

/// POST /api/videos/:video_id/transcribe
pub async fn transcribe_video(
    State(state): State<AppState>,
    user: AuthUser,
    Path(video_id): Path<String>,
    Json(request): Json<TranscribeRequest>,
) -> ApiResult<(StatusCode, Json<EnqueuedResponse>)> {
    let video_id = VideoId::from(validate_path_id("video", &video_id)?);
    request
        .validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;
    let keys = byok_keys_from(request.byok_keys)?;

    state
        .rate_limiter
        .enforce(RateLimitRule::VIDEO_PROCESS, &user.user_id)
        .await?;

    let mut job = SttJob::new(video_id, request.source_file_path, request.strategy);
    if let Some(language) = request.language {
        job = job.with_language(language);
    }

    let job_id = state
        .pipeline
        .start_transcription(&user.user_id, job, Some(&keys))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            job_id: job_id.to_string(),
            queue: SttJob::QUEUE,
        }),
    ))
}

/// POST /api/videos/:video_id/cancel
pub async fn cancel_video(
    State(state): State<AppState>,
    user: AuthUser,
    Path(video_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let video_id = VideoId::from(validate_path_id("video", &video_id)?);

    state
        .rate_limiter
        .enforce(RateLimitRule::VIDEO_CANCEL, &user.user_id)
        .await?;

    let cancelled = state.pipeline.cancel_video(&video_id).await?;
    info!(user_id = %user.user_id, video_id = %video_id, cancelled, "Video cancelled");

    Ok(Json(CancelResponse { cancelled }))
}
