//! Authenticated self-service profile updates.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::instrument;

use super::error::AuthError;
use super::principal::require_auth;
use super::state::AuthState;
use super::storage::update_profile;
use super::types::{AccountResponse, ProfileUpdateRequest};

#[utoipa::path(
    patch,
    path = "/v1/auth/profile",
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Profile updated", body = AccountResponse),
        (status = 400, description = "No updates provided", body = String),
        (status = 401, description = "Missing or invalid session", body = String),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn patch_profile(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ProfileUpdateRequest>>,
) -> Result<Response, AuthError> {
    let principal = require_auth(&headers, &pool, &auth_state).await?;

    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("Missing payload".to_string()));
    };

    let name = normalize_optional(request.name);
    let phone = normalize_optional(request.phone);
    let bio = normalize_optional(request.bio);
    let photo = normalize_optional(request.photo);

    if name.is_none() && phone.is_none() && bio.is_none() && photo.is_none() {
        return Err(AuthError::Validation("No updates provided".to_string()));
    }

    let account = update_profile(&pool, principal.user_id, name, phone, bio, photo)
        .await?
        .ok_or(AuthError::NotFound)?;

    Ok((StatusCode::OK, Json(AccountResponse::from(account))).into_response())
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
