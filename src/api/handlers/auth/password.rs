//! Password reset (token-based) and change (current-password-based).

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::api::email::{EmailMessage, enqueue_email};
use crate::api::handlers::{valid_email, valid_password};

use super::codec::{generate_link_secret, hash_secret};
use super::error::AuthError;
use super::hasher::{hash_password, verify_password};
use super::principal::require_auth;
use super::state::AuthState;
use super::storage::{
    AccountRecord, TokenPurpose, find_account_by_email, find_account_by_id, issue_token,
    redeem_password_reset, update_password,
};
use super::types::{
    ChangePasswordRequest, ForgotPasswordRequest, MessageResponse, ResetPasswordRequest,
};

/// Build the frontend reset link included in outbound emails.
pub(super) fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password#token={token}")
}

/// Issue a reset token for the account and email the link.
#[utoipa::path(
    post,
    path = "/v1/auth/password/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset email queued", body = MessageResponse),
        (status = 404, description = "User not found", body = String),
        (status = 502, description = "Reset email could not be queued", body = String),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn forgot_password(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<Response, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("Missing payload".to_string()));
    };

    let email = request.email.trim();
    if !valid_email(email) {
        return Err(AuthError::Validation("Invalid email".to_string()));
    }

    let account = find_account_by_email(&pool, email)
        .await?
        .ok_or(AuthError::NotFound)?;

    let raw = generate_link_secret(account.id)?;
    let payload_hash = hash_secret(&raw);
    issue_token(
        &pool,
        account.id,
        TokenPurpose::PasswordReset,
        &payload_hash,
        auth_state.config().email_token_ttl_seconds(),
    )
    .await?;

    let message = reset_message(&auth_state, &account, &raw);
    enqueue_email(&pool, &message)
        .await
        .map_err(|_| AuthError::Delivery)?;

    debug!("Password reset email queued for {}", account.id);

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Password reset email sent")),
    )
        .into_response())
}

/// Redeem a reset link with a new password. No old password is required:
/// reset exists because the user cannot authenticate.
#[utoipa::path(
    put,
    path = "/v1/auth/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid/expired token or weak password", body = String),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<Response, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("Missing payload".to_string()));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(AuthError::Validation("Missing token".to_string()));
    }
    if !valid_password(&request.password) {
        return Err(AuthError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let payload_hash = hash_secret(token);
    let new_hash = hash_password(&request.password)?;

    if !redeem_password_reset(&pool, &payload_hash, &new_hash).await? {
        return Err(AuthError::InvalidOrExpiredToken);
    }

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Password reset successful, please login")),
    )
        .into_response())
}

/// Change the password for the authenticated account; the current password
/// must be presented, unlike reset.
#[utoipa::path(
    patch,
    path = "/v1/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Weak password", body = String),
        (status = 401, description = "Missing session or wrong old password", body = String),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Result<Response, AuthError> {
    let principal = require_auth(&headers, &pool, &auth_state).await?;

    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("Missing payload".to_string()));
    };

    if request.old_password.is_empty() {
        return Err(AuthError::Validation("Missing old password".to_string()));
    }
    if !valid_password(&request.new_password) {
        return Err(AuthError::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let account = find_account_by_id(&pool, principal.user_id)
        .await?
        .ok_or(AuthError::NotFound)?;

    if !verify_password(&request.old_password, &account.password_hash) {
        return Err(AuthError::Unauthorized("Old password is incorrect"));
    }

    let new_hash = hash_password(&request.new_password)?;
    update_password(&pool, account.id, &new_hash).await?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Password changed successfully")),
    )
        .into_response())
}

fn reset_message(auth_state: &AuthState, account: &AccountRecord, raw_token: &str) -> EmailMessage {
    let config = auth_state.config();
    EmailMessage {
        subject: "Reset your password".to_string(),
        to_email: account.email.clone(),
        from_email: config.email_from().to_string(),
        reply_to: config.email_reply_to().to_string(),
        template: "reset_password".to_string(),
        name: account.name.clone(),
        link: build_reset_url(config.frontend_base_url(), raw_token),
    }
}
