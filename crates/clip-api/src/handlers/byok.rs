//! BYOK key cache handlers.

use std::collections::HashMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use clip_llm::ByokProvider;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::byok_keys_from;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CacheByokRequest {
    pub keys: HashMap<ByokProvider, String>,
}

#[derive(Debug, Serialize)]
pub struct ByokStatusResponse {
    pub cached: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<ByokProvider>,
}

/// PUT /api/byok
pub async fn cache_byok_keys(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CacheByokRequest>,
) -> ApiResult<Json<ByokStatusResponse>> {
    let keys = byok_keys_from(request.keys)?;
    if keys.is_empty() {
        return Err(ApiError::validation("No keys supplied"));
    }

    let providers = state.pipeline.byok().cache_keys(&user.user_id, &keys).await?;
    Ok(Json(ByokStatusResponse {
        cached: true,
        providers,
    }))
}

/// GET /api/byok
pub async fn byok_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<ByokStatusResponse>> {
    let cached = state.pipeline.byok().has_any(&user.user_id).await?;
    Ok(Json(ByokStatusResponse {
        cached,
        providers: Vec::new(),
    }))
}

/// DELETE /api/byok
pub async fn clear_byok_keys(State(state): State<AppState>, user: AuthUser) -> ApiResult<StatusCode> {
    state.pipeline.byok().clear(&user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
