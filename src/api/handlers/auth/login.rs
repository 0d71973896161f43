//! Password login and the email code challenge.
//!
//! State machine per attempt:
//! 1. Password verified, then device trust decides the path.
//! 2. Trusted user-agent: session issued directly.
//! 3. Untrusted: a 6-digit code is encrypted, stored as a `login_code`
//!    token (1h TTL), and emailed. No session yet.
//! 4. Redemption compares the typed code against the decrypted token;
//!    a match trusts the agent, consumes the token, and issues a session.
//!    A mismatch leaves the token live for another attempt.
//! 5. Resend re-reads and re-delivers the live code; it never reissues.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::api::email::{EmailMessage, enqueue_email};
use crate::api::handlers::valid_email;

use super::codec::generate_login_code;
use super::device;
use super::error::AuthError;
use super::hasher::verify_password;
use super::session::session_cookie;
use super::state::AuthState;
use super::storage::{
    AccountRecord, Role, TokenPurpose, consume_token, find_account_by_email, find_live_token,
    issue_token, trust_agent,
};
use super::types::{AccountResponse, ChallengeResponse, LoginCodeRequest, LoginRequest,
    MessageResponse, ResendCodeRequest};

const BAD_CREDENTIALS: &str = "Invalid email or password";

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AccountResponse),
        (status = 202, description = "New device, login code emailed", body = ChallengeResponse),
        (status = 401, description = "Unauthorized", body = String),
        (status = 502, description = "Login code email could not be queued", body = String),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("Missing payload".to_string()));
    };

    let email = request.email.trim();
    if !valid_email(email) {
        return Err(AuthError::Validation("Invalid email".to_string()));
    }
    if request.password.is_empty() {
        return Err(AuthError::Validation("Missing password".to_string()));
    }

    let account = authenticate(&pool, email, &request.password).await?;

    let fingerprint = device::fingerprint(&headers);
    if device::is_trusted(&account, &fingerprint) {
        debug!("Known device, issuing session");
        return issue_session(&auth_state, account);
    }

    debug!("Unknown device, starting login code challenge");

    // Token first, delivery second: a failed enqueue leaves the code
    // redeemable through the resend path.
    let code = generate_login_code();
    let ciphertext = auth_state.codec().encrypt(&code)?;
    issue_token(
        &pool,
        account.id,
        TokenPurpose::LoginCode,
        &ciphertext,
        auth_state.config().login_code_ttl_seconds(),
    )
    .await?;

    let message = login_code_message(&auth_state, &account, &code);
    enqueue_email(&pool, &message)
        .await
        .map_err(|_| AuthError::Delivery)?;

    Ok((StatusCode::ACCEPTED, Json(ChallengeResponse::pending())).into_response())
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/code",
    request_body = LoginCodeRequest,
    responses(
        (status = 200, description = "Code accepted, session issued", body = AccountResponse),
        (status = 400, description = "Incorrect, invalid, or expired code", body = String),
        (status = 404, description = "Account not found", body = String),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login_code(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginCodeRequest>>,
) -> Result<Response, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("Missing payload".to_string()));
    };

    let email = request.email.trim();
    let code = request.code.trim();
    if email.is_empty() || code.is_empty() {
        return Err(AuthError::Validation(
            "Please fill all the fields".to_string(),
        ));
    }

    let account = find_account_by_email(&pool, email)
        .await?
        .ok_or(AuthError::NotFound)?;

    let record = find_live_token(&pool, account.id, TokenPurpose::LoginCode)
        .await?
        .ok_or(AuthError::InvalidOrExpiredToken)?;

    let stored_code = auth_state
        .codec()
        .decrypt(&record.payload)
        .map_err(AuthError::Decryption)?;

    if stored_code != code {
        // The token stays live; retries are allowed until it expires.
        return Err(AuthError::IncorrectLoginCode);
    }

    let fingerprint = device::fingerprint(&headers);
    trust_agent(&pool, account.id, &fingerprint).await?;
    consume_token(&pool, record.id).await?;

    debug!("Login code accepted, issuing session");
    issue_session(&auth_state, account)
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/resend",
    request_body = ResendCodeRequest,
    responses(
        (status = 200, description = "Login code re-sent", body = MessageResponse),
        (status = 400, description = "No live login code", body = String),
        (status = 404, description = "Account not found", body = String),
        (status = 502, description = "Login code email could not be queued", body = String),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login_resend(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendCodeRequest>>,
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

    // Re-read the live token; resending never mints a new code.
    let record = find_live_token(&pool, account.id, TokenPurpose::LoginCode)
        .await?
        .ok_or(AuthError::InvalidOrExpiredToken)?;

    let code = auth_state
        .codec()
        .decrypt(&record.payload)
        .map_err(AuthError::Decryption)?;

    let message = login_code_message(&auth_state, &account, &code);
    enqueue_email(&pool, &message)
        .await
        .map_err(|_| AuthError::Delivery)?;

    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Login code sent")),
    )
        .into_response())
}

async fn authenticate(
    pool: &PgPool,
    email: &str,
    password: &str,
) -> Result<AccountRecord, AuthError> {
    // Unknown email and wrong password answer the same way.
    let Some(account) = find_account_by_email(pool, email).await? else {
        return Err(AuthError::Unauthorized(BAD_CREDENTIALS));
    };

    if !verify_password(password, &account.password_hash) {
        return Err(AuthError::Unauthorized(BAD_CREDENTIALS));
    }

    if matches!(account.role, Role::Suspended) {
        return Err(AuthError::Unauthorized(
            "Account suspended, please contact support",
        ));
    }

    Ok(account)
}

fn issue_session(auth_state: &AuthState, account: AccountRecord) -> Result<Response, AuthError> {
    let token = auth_state
        .session()
        .sign(account.id, auth_state.config().session_ttl_seconds())?;
    let cookie = session_cookie(auth_state.config(), &token)
        .map_err(|e| anyhow::anyhow!("failed to build session cookie: {e}"))?;

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);

    Ok((StatusCode::OK, headers, Json(AccountResponse::from(account))).into_response())
}

fn login_code_message(auth_state: &AuthState, account: &AccountRecord, code: &str) -> EmailMessage {
    let config = auth_state.config();
    EmailMessage {
        subject: "Your login code".to_string(),
        to_email: account.email.clone(),
        from_email: config.email_from().to_string(),
        reply_to: config.email_reply_to().to_string(),
        template: "login_code".to_string(),
        name: account.name.clone(),
        // The template renders the code from the link slot.
        link: code.to_string(),
    }
}
