//! Internal caller authentication.
//!
//! The API sits behind the web tier, which authenticates end users. Callers
//! present the shared `INTERNAL_API_TOKEN` as a bearer token and name the
//! acting user in `X-User-Id`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "X-User-Id";

const MAX_USER_ID_LEN: usize = 128;

/// User on whose behalf an upstream service calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

fn tokens_match(expected: &str, presented: &str) -> bool {
    if expected.len() != presented.len() {
        return false;
    }
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(expected) = state.config.internal_api_token.as_deref() {
            let TypedHeader(Authorization(bearer)) =
                TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::unauthorized("Missing or malformed bearer token"))?;
            if !tokens_match(expected, bearer.token()) {
                return Err(ApiError::unauthorized("Invalid bearer token"));
            }
        }

        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= MAX_USER_ID_LEN)
            .ok_or_else(|| ApiError::unauthorized("Missing X-User-Id header"))?;

        Ok(AuthUser {
            user_id: user_id.to_string(),
        })
    }
}
