//! Rate-limit checks on behalf of upstream services.
//!
//! The web tier guards its own flows (login, password reset, platform
//! connect) through this endpoint so every replica shares one counter.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::rate_limit::{RateLimitDecision, RateLimitRule};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RateLimitCheckRequest {
    pub scope: String,
    /// Caller identity for the bucket: user id, client IP, normalized email
    #[validate(length(min = 1, max = 256))]
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct RateLimitCheckResponse {
    pub allowed: bool,
    /// Calls counted in the current window, absent when the store was down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    pub limit: u64,
    /// The counter store was unreachable and the call was let through
    pub degraded: bool,
}

/// POST /api/rate-limits/check
///
/// 200 when allowed, 429 with `Retry-After` when the bucket is full.
pub async fn check_rate_limit(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(request): Json<RateLimitCheckRequest>,
) -> ApiResult<Json<RateLimitCheckResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;
    let rule = RateLimitRule::by_scope(&request.scope)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown rate limit scope: {}", request.scope)))?;

    let decision = state.rate_limiter.enforce(rule, &request.key).await?;
    let count = match decision {
        RateLimitDecision::Allowed { count } => Some(count),
        _ => None,
    };

    Ok(Json(RateLimitCheckResponse {
        allowed: true,
        count,
        limit: rule.limit,
        degraded: decision == RateLimitDecision::Unavailable,
    }))
}
