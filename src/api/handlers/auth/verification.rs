//! Email verification endpoints.

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

use super::codec::{generate_link_secret, hash_secret};
use super::error::AuthError;
use super::principal::require_auth;
use super::state::AuthState;
use super::storage::{
    AccountRecord, TokenPurpose, VerifyOutcome, find_account_by_id, issue_token,
    redeem_verification,
};
use super::types::{MessageResponse, VerifyEmailRequest};

/// Build the frontend verification link included in outbound emails.
pub(super) fn build_verify_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/verify-email#token={token}")
}

/// Issue a verification token for the authenticated account and email the
/// link. The raw secret goes into the link; only its hash is stored.
#[utoipa::path(
    post,
    path = "/v1/auth/verify/send",
    responses(
        (status = 200, description = "Verification email queued", body = MessageResponse),
        (status = 400, description = "Email already verified", body = String),
        (status = 401, description = "Missing or invalid session", body = String),
        (status = 502, description = "Verification email could not be queued", body = String),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn send_verification(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, AuthError> {
    let principal = require_auth(&headers, &pool, &auth_state).await?;

    let account = find_account_by_id(&pool, principal.user_id)
        .await?
        .ok_or(AuthError::NotFound)?;

    if account.verified {
        return Err(AuthError::AlreadyVerified);
    }

    let raw = generate_link_secret(account.id)?;
    let payload_hash = hash_secret(&raw);
    issue_token(
        &pool,
        account.id,
        TokenPurpose::EmailVerification,
        &payload_hash,
        auth_state.config().email_token_ttl_seconds(),
    )
    .await?;

    let message = verification_message(&auth_state, &account, &raw);
    enqueue_email(&pool, &message)
        .await
        .map_err(|_| AuthError::Delivery)?;

    debug!("Verification email queued for {}", account.id);

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Verification email sent")),
    )
        .into_response())
}

/// Redeem the emailed link: the presented value is hashed and matched
/// against the live token.
#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Account verified", body = MessageResponse),
        (status = 400, description = "Invalid/expired token or already verified", body = String),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn verify_email(
    pool: Extension<PgPool>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> Result<Response, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("Missing payload".to_string()));
    };

    let token = request.token.trim();
    if token.is_empty() {
        return Err(AuthError::Validation("Missing token".to_string()));
    }

    // Hash the token before lookup; raw secrets are never stored server-side.
    let payload_hash = hash_secret(token);
    match redeem_verification(&pool, &payload_hash).await? {
        VerifyOutcome::Verified => Ok((
            StatusCode::OK,
            Json(MessageResponse::new("Account verification successful")),
        )
            .into_response()),
        VerifyOutcome::AlreadyVerified => Err(AuthError::AlreadyVerified),
        VerifyOutcome::Invalid => Err(AuthError::InvalidOrExpiredToken),
    }
}

fn verification_message(
    auth_state: &AuthState,
    account: &AccountRecord,
    raw_token: &str,
) -> EmailMessage {
    let config = auth_state.config();
    EmailMessage {
        subject: "Verify your account".to_string(),
        to_email: account.email.clone(),
        from_email: config.email_from().to_string(),
        reply_to: config.email_reply_to().to_string(),
        template: "verify_email".to_string(),
        name: account.name.clone(),
        link: build_verify_url(config.frontend_base_url(), raw_token),
    }
}
