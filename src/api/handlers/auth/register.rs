//! Account registration.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::api::handlers::{valid_email, valid_password};

use super::error::AuthError;
use super::hasher::hash_password;
use super::session::session_cookie;
use super::state::AuthState;
use super::storage::{SignupOutcome, insert_account};
use super::types::{AccountResponse, RegisterRequest};

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = AccountResponse),
        (status = 400, description = "Missing or malformed input", body = String),
        (status = 409, description = "Email id already exists", body = String),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn register(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<Response, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("Missing payload".to_string()));
    };

    let name = request.name.trim();
    let email = request.email.trim();
    let password = request.password.as_str();

    if name.is_empty() || email.is_empty() || password.trim().is_empty() {
        return Err(AuthError::Validation(
            "Please fill all the fields".to_string(),
        ));
    }
    if !valid_email(email) {
        return Err(AuthError::Validation("Invalid email".to_string()));
    }
    if !valid_password(password) {
        return Err(AuthError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let password_hash = hash_password(password)?;

    let account = match insert_account(&pool, name, email, &password_hash).await? {
        SignupOutcome::Created(account) => account,
        SignupOutcome::DuplicateEmail => return Err(AuthError::DuplicateEmail),
    };

    debug!("Account created: {}", account.id);

    // Registration signs the user in directly.
    let token = auth_state
        .session()
        .sign(account.id, auth_state.config().session_ttl_seconds())?;
    let cookie = session_cookie(auth_state.config(), &token)
        .map_err(|e| anyhow::anyhow!("failed to build session cookie: {e}"))?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    Ok((
        StatusCode::CREATED,
        headers,
        Json(AccountResponse::from(account)),
    )
        .into_response())
}
