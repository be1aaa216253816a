//! Publication handlers.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use clip_models::{ClipId, Platform, PublicationId};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::validate_path_id;
use crate::rate_limit::RateLimitRule;
use crate::services::{ClipPublication, PlatformToken, PublicationTarget};
use crate::state::AppState;

/// Longest accepted scheduling delay (30 days).
const MAX_PUBLISH_DELAY_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Deserialize, Validate)]
pub struct PublishRequest {
    #[validate(length(min = 1, max = 1024))]
    pub source_file_path: String,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 8))]
    pub targets: Vec<PublishTargetRequest>,
}

#[derive(Debug, Deserialize)]
pub struct PublishTargetRequest {
    pub publication_id: String,
    pub platform: Platform,
    pub token: PlatformToken,
    /// Seconds to wait before publishing
    #[serde(default)]
    pub delay_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub job_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelPublicationResponse {
    pub removed: bool,
}

/// POST /api/clips/:clip_id/publications
pub async fn publish_clip(
    State(state): State<AppState>,
    user: AuthUser,
    Path(clip_id): Path<String>,
    Json(request): Json<PublishRequest>,
) -> ApiResult<(StatusCode, Json<PublishResponse>)> {
    let clip_id = ClipId::from(validate_path_id("clip", &clip_id)?);
    request
        .validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;

    let mut targets = Vec::with_capacity(request.targets.len());
    for target in request.targets {
        let publication_id = validate_path_id("publication", &target.publication_id)?;
        let delay = match target.delay_secs {
            Some(secs) if secs > MAX_PUBLISH_DELAY_SECS => {
                return Err(ApiError::validation("delay_secs exceeds 30 days"));
            }
            Some(secs) if secs > 0 => Some(Duration::from_secs(secs)),
            _ => None,
        };
        targets.push(PublicationTarget {
            publication_id: PublicationId::from(publication_id),
            platform: target.platform,
            token: target.token,
            delay,
        });
    }

    state
        .rate_limiter
        .enforce(RateLimitRule::CLIP_PUBLISH, &user.user_id)
        .await?;

    let clip = ClipPublication {
        clip_id,
        source_file_path: request.source_file_path,
        title: request.title,
        description: request.description,
    };
    let ids = state.pipeline.enqueue_publications(&clip, &targets).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            job_ids: ids.iter().map(|id| id.to_string()).collect(),
        }),
    ))
}

/// DELETE /api/publications/:publication_id
pub async fn cancel_publication(
    State(state): State<AppState>,
    user: AuthUser,
    Path(publication_id): Path<String>,
) -> ApiResult<Json<CancelPublicationResponse>> {
    let publication_id = PublicationId::from(validate_path_id("publication", &publication_id)?);

    state
        .rate_limiter
        .enforce(RateLimitRule::CLIP_PUBLISH, &user.user_id)
        .await?;

    let removed = state.pipeline.cancel_publication(&publication_id).await?;
    Ok(Json(CancelPublicationResponse { removed }))
}
