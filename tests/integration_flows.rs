//! End-to-end flow tests against a real Postgres database.
//!
//! These tests exercise the token lifecycle: challenge issuance and
//! redemption, supersede-on-reissue, lazy expiry, verification idempotency,
//! and password reset consumption.
//!
//! They are `#[ignore]`d by default and require `CUSTOS_TEST_DSN` to point
//! at a database with the `migrations/` schema applied:
//!
//! ```sh
//! CUSTOS_TEST_DSN=postgres://postgres@localhost/custos_test \
//!     cargo test --test integration_flows -- --ignored
//! ```

use anyhow::{Context, Result, bail};
use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::IntoResponse,
};
use custos::api::handlers::auth::codec::LoginCodeCodec;
use custos::api::handlers::auth::state::{AuthConfig, AuthState};
use custos::api::handlers::auth::types::{
    ForgotPasswordRequest, LoginCodeRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
    VerifyEmailRequest,
};
use custos::api::handlers::auth::{login, password, register, session, verification};
use custos::api::handlers::users;
use custos::cli::globals::GlobalArgs;
use secrecy::SecretString;
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::env;
use std::sync::Arc;
use uuid::Uuid;

const CODE_KEY: &str = "6fdbe07a62cf9a35c7cf5e803eaf63eee82dbecb1a14e7f8483b86d4e8cc1a07";

fn test_state() -> Result<Arc<AuthState>> {
    let globals = GlobalArgs::new(
        SecretString::from("integration-secret"),
        SecretString::from(CODE_KEY),
    );
    Ok(Arc::new(AuthState::from_globals(
        AuthConfig::new("http://localhost:3000".to_string()),
        &globals,
    )?))
}

async fn test_pool() -> Result<PgPool> {
    let dsn = env::var("CUSTOS_TEST_DSN").context("CUSTOS_TEST_DSN is not set")?;
    PgPoolOptions::new()
        .max_connections(2)
        .connect(&dsn)
        .await
        .context("failed to connect to test database")
}

fn unique_email(prefix: &str) -> String {
    format!("{prefix}-{}@example.com", Uuid::new_v4().simple())
}

fn headers_with_agent(agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_str(agent)?);
    Ok(headers)
}

fn session_cookie_from(response_headers: &HeaderMap) -> Option<String> {
    let value = response_headers.get(header::SET_COOKIE)?.to_str().ok()?;
    let pair = value.split(';').next()?;
    Some(pair.trim().to_string())
}

fn headers_with_cookie(cookie_pair: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, HeaderValue::from_str(cookie_pair)?);
    Ok(headers)
}

async fn register_account(
    pool: &PgPool,
    state: &Arc<AuthState>,
    email: &str,
) -> Result<(Uuid, String)> {
    let response = register::register(
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(RegisterRequest {
            name: "Flow Tester".to_string(),
            email: email.to_string(),
            password: "hunter22!".to_string(),
        })),
    )
    .await
    .into_response();
    if response.status() != StatusCode::CREATED {
        bail!("registration failed with {}", response.status());
    }
    let cookie =
        session_cookie_from(response.headers()).context("registration set no session cookie")?;

    let row = sqlx::query("SELECT id FROM users WHERE email = $1")
        .bind(email)
        .fetch_one(pool)
        .await?;
    Ok((row.get("id"), cookie))
}

async fn stored_token_payload(pool: &PgPool, user_id: Uuid, purpose: &str) -> Result<Option<String>> {
    let row = sqlx::query(
        "SELECT payload FROM ephemeral_tokens WHERE user_id = $1 AND purpose = $2 LIMIT 1",
    )
    .bind(user_id)
    .bind(purpose)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| row.get("payload")))
}

async fn latest_outbox_link(pool: &PgPool, to_email: &str, template: &str) -> Result<String> {
    let row = sqlx::query(
        "SELECT payload_json->>'link' AS link FROM email_outbox \
         WHERE to_email = $1 AND template = $2 \
         ORDER BY created_at DESC LIMIT 1",
    )
    .bind(to_email)
    .bind(template)
    .fetch_one(pool)
    .await?;
    let link: String = row.get("link");
    Ok(link)
}

fn token_from_link(link: &str) -> Result<String> {
    link.split("#token=")
        .nth(1)
        .map(ToString::to_string)
        .context("link carries no token fragment")
}

#[tokio::test]
#[ignore = "requires CUSTOS_TEST_DSN"]
async fn duplicate_registration_conflicts() -> Result<()> {
    let pool = test_pool().await?;
    let state = test_state()?;
    let email = unique_email("dup");

    register_account(&pool, &state, &email).await?;

    let response = register::register(
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(RegisterRequest {
            name: "Second".to_string(),
            email: email.clone(),
            password: "hunter22!".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
#[ignore = "requires CUSTOS_TEST_DSN"]
async fn untrusted_device_runs_code_challenge() -> Result<()> {
    let pool = test_pool().await?;
    let state = test_state()?;
    let email = unique_email("challenge");
    let (user_id, _) = register_account(&pool, &state, &email).await?;

    // Unknown user-agent: challenge-pending, no cookie.
    let response = login::login(
        headers_with_agent("UA-X")?,
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginRequest {
            email: email.clone(),
            password: "hunter22!".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(session_cookie_from(response.headers()).is_none());

    let payload = stored_token_payload(&pool, user_id, "login_code")
        .await?
        .context("no login_code token issued")?;
    let codec = LoginCodeCodec::from_hex_key(CODE_KEY)?;
    let code = codec.decrypt(&payload)?;
    assert_eq!(code.len(), 6);

    // A wrong guess fails and leaves the token live.
    let response = login::login_code(
        headers_with_agent("UA-X")?,
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginCodeRequest {
            email: email.clone(),
            code: "000000".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(
        stored_token_payload(&pool, user_id, "login_code")
            .await?
            .is_some()
    );

    // The correct code issues a session and trusts the agent.
    let response = login::login_code(
        headers_with_agent("UA-X")?,
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginCodeRequest {
            email: email.clone(),
            code: code.clone(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie_from(response.headers()).is_some());

    // Redemption consumed the token.
    assert!(
        stored_token_payload(&pool, user_id, "login_code")
            .await?
            .is_none()
    );

    // The same user-agent now skips the challenge.
    let response = login::login(
        headers_with_agent("UA-X")?,
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginRequest {
            email: email.clone(),
            password: "hunter22!".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie_from(response.headers()).is_some());
    Ok(())
}

#[tokio::test]
#[ignore = "requires CUSTOS_TEST_DSN"]
async fn reissued_code_supersedes_previous() -> Result<()> {
    let pool = test_pool().await?;
    let state = test_state()?;
    let email = unique_email("supersede");
    let (user_id, _) = register_account(&pool, &state, &email).await?;

    login::login(
        headers_with_agent("UA-N")?,
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginRequest {
            email: email.clone(),
            password: "hunter22!".to_string(),
        })),
    )
    .await
    .into_response();
    let first = stored_token_payload(&pool, user_id, "login_code")
        .await?
        .context("first challenge issued no token")?;

    login::login(
        headers_with_agent("UA-N")?,
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginRequest {
            email: email.clone(),
            password: "hunter22!".to_string(),
        })),
    )
    .await
    .into_response();
    let second = stored_token_payload(&pool, user_id, "login_code")
        .await?
        .context("second challenge issued no token")?;

    assert_ne!(first, second, "old payload must be superseded");

    let count: i64 =
        sqlx::query("SELECT COUNT(*) AS n FROM ephemeral_tokens WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await?
            .get("n");
    assert_eq!(count, 1, "at most one live token per (account, purpose)");
    Ok(())
}

#[tokio::test]
#[ignore = "requires CUSTOS_TEST_DSN"]
async fn expired_code_is_rejected() -> Result<()> {
    let pool = test_pool().await?;
    let state = test_state()?;
    let email = unique_email("expiry");
    let (user_id, _) = register_account(&pool, &state, &email).await?;

    login::login(
        headers_with_agent("UA-E")?,
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginRequest {
            email: email.clone(),
            password: "hunter22!".to_string(),
        })),
    )
    .await
    .into_response();

    let payload = stored_token_payload(&pool, user_id, "login_code")
        .await?
        .context("no login_code token issued")?;
    let code = LoginCodeCodec::from_hex_key(CODE_KEY)?.decrypt(&payload)?;

    // Push the token past its TTL; lazy expiry must reject it.
    sqlx::query(
        "UPDATE ephemeral_tokens SET expires_at = NOW() - INTERVAL '1 second' WHERE user_id = $1",
    )
    .bind(user_id)
    .execute(&pool)
    .await?;

    let response = login::login_code(
        headers_with_agent("UA-E")?,
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginCodeRequest {
            email: email.clone(),
            code,
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Resend has nothing live to re-deliver either.
    let response = login::login_resend(
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(custos::api::handlers::auth::types::ResendCodeRequest {
            email: email.clone(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
#[ignore = "requires CUSTOS_TEST_DSN"]
async fn verification_is_idempotent_per_account_flag() -> Result<()> {
    let pool = test_pool().await?;
    let state = test_state()?;
    let email = unique_email("verify");
    let (_user_id, cookie) = register_account(&pool, &state, &email).await?;

    let response = verification::send_verification(
        headers_with_cookie(&cookie)?,
        Extension(pool.clone()),
        Extension(state.clone()),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);

    let link = latest_outbox_link(&pool, &email, "verify_email").await?;
    let raw_token = token_from_link(&link)?;

    let verify = |token: String| {
        let pool = pool.clone();
        async move {
            verification::verify_email(
                Extension(pool),
                Some(Json(VerifyEmailRequest { token })),
            )
            .await
            .into_response()
        }
    };

    let response = verify(raw_token.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Second redemption of the same link: the account flag rejects it.
    let response = verify(raw_token).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // And re-requesting a verification email is refused outright.
    let response = verification::send_verification(
        headers_with_cookie(&cookie)?,
        Extension(pool.clone()),
        Extension(state.clone()),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
#[ignore = "requires CUSTOS_TEST_DSN"]
async fn password_reset_consumes_token() -> Result<()> {
    let pool = test_pool().await?;
    let state = test_state()?;
    let email = unique_email("reset");
    register_account(&pool, &state, &email).await?;

    let response = password::forgot_password(
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(ForgotPasswordRequest {
            email: email.clone(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);

    let link = latest_outbox_link(&pool, &email, "reset_password").await?;
    let raw_token = token_from_link(&link)?;

    // Reset succeeds with no old password supplied.
    let response = password::reset_password(
        Extension(pool.clone()),
        Some(Json(ResetPasswordRequest {
            token: raw_token.clone(),
            password: "brand-new-pass".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);

    // The consumed token cannot be redeemed again.
    let response = password::reset_password(
        Extension(pool.clone()),
        Some(Json(ResetPasswordRequest {
            token: raw_token,
            password: "another-new-pass".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Old password no longer authenticates; the new one does.
    let response = login::login(
        headers_with_agent("UA-R")?,
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginRequest {
            email: email.clone(),
            password: "hunter22!".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = login::login(
        headers_with_agent("UA-R")?,
        Extension(pool.clone()),
        Extension(state.clone()),
        Some(Json(LoginRequest {
            email: email.clone(),
            password: "brand-new-pass".to_string(),
        })),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    Ok(())
}

#[tokio::test]
#[ignore = "requires CUSTOS_TEST_DSN"]
async fn role_gates_user_management() -> Result<()> {
    let pool = test_pool().await?;
    let state = test_state()?;
    let email = unique_email("rbac");
    let (user_id, cookie) = register_account(&pool, &state, &email).await?;

    // A regular user cannot list accounts.
    let response = users::list_users(
        headers_with_cookie(&cookie)?,
        Extension(pool.clone()),
        Extension(state.clone()),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Promote to admin out-of-band, then the same session passes the gate.
    sqlx::query("UPDATE users SET role = 'admin' WHERE id = $1")
        .bind(user_id)
        .execute(&pool)
        .await?;

    let response = users::list_users(
        headers_with_cookie(&cookie)?,
        Extension(pool.clone()),
        Extension(state.clone()),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);

    // Suspended accounts lose their session on the next request.
    sqlx::query("UPDATE users SET role = 'suspended' WHERE id = $1")
        .bind(user_id)
        .execute(&pool)
        .await?;

    let response = users::get_user(
        Path(user_id.to_string()),
        headers_with_cookie(&cookie)?,
        Extension(pool.clone()),
        Extension(state.clone()),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Session endpoint still resolves the account payload for valid cookies.
    let response = session::session(
        headers_with_cookie(&cookie)?,
        Extension(pool.clone()),
        Extension(state.clone()),
    )
    .await
    .into_response();
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
