//! Role-based user management endpoints.
//!
//! Flow Overview:
//! 1) Authenticate the request via session cookie.
//! 2) Enforce role-based access for /users routes.
//! 3) Perform the requested read, role change, or deletion.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::error::AuthError;
use super::auth::principal::{require_admin, require_auth, require_author};
use super::auth::state::AuthState;
use super::auth::storage::{
    Role, delete_account, find_account_by_id, list_accounts, set_role,
};
use super::auth::types::AccountResponse;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserRoleResponse {
    pub id: String,
    pub role: String,
}

#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "List users (author or admin).", body = [AccountResponse]),
        (status = 401, description = "Missing session or insufficient role."),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn list_users(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, AuthError> {
    let principal = require_auth(&headers, &pool, &auth_state).await?;
    require_author(&principal)?;

    let accounts = list_accounts(&pool).await?;
    let list: Vec<AccountResponse> = accounts.into_iter().map(AccountResponse::from).collect();
    Ok((StatusCode::OK, Json(list)).into_response())
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User detail (admin-only).", body = AccountResponse),
        (status = 400, description = "Invalid user id."),
        (status = 401, description = "Missing session or insufficient role."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn get_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, AuthError> {
    let principal = require_auth(&headers, &pool, &auth_state).await?;
    require_admin(&principal)?;

    let user_id = parse_user_id(&id)?;
    let account = find_account_by_id(&pool, user_id)
        .await?
        .ok_or(AuthError::NotFound)?;
    Ok((StatusCode::OK, Json(AccountResponse::from(account))).into_response())
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}/role",
    request_body = UserRoleRequest,
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "Role updated (admin-only).", body = UserRoleResponse),
        (status = 400, description = "Invalid role or user id."),
        (status = 401, description = "Missing session or insufficient role."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn set_user_role(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UserRoleRequest>>,
) -> Result<Response, AuthError> {
    let principal = require_auth(&headers, &pool, &auth_state).await?;
    require_admin(&principal)?;

    let Some(Json(request)) = payload else {
        return Err(AuthError::Validation("Missing payload".to_string()));
    };

    let user_id = parse_user_id(&id)?;
    let role = Role::parse(&request.role)
        .ok_or_else(|| AuthError::Validation("Unknown role".to_string()))?;

    if !set_role(&pool, user_id, role).await? {
        return Err(AuthError::NotFound);
    }

    Ok((
        StatusCode::OK,
        Json(UserRoleResponse {
            id: user_id.to_string(),
            role: role.as_str().to_string(),
        }),
    )
        .into_response())
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(
        ("id" = String, Path, description = "User id")
    ),
    responses(
        (status = 204, description = "User deleted (admin-only)."),
        (status = 400, description = "Invalid user id."),
        (status = 401, description = "Missing session or insufficient role."),
        (status = 404, description = "User not found."),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn delete_user(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, AuthError> {
    let principal = require_auth(&headers, &pool, &auth_state).await?;
    require_admin(&principal)?;

    let user_id = parse_user_id(&id)?;
    if !delete_account(&pool, user_id).await? {
        return Err(AuthError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn parse_user_id(id: &str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(id.trim()).map_err(|_| AuthError::Validation("Invalid user id".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::AuthConfig;
    use crate::cli::globals::GlobalArgs;
    use anyhow::Result;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state() -> Result<Arc<AuthState>> {
        let globals = GlobalArgs::new(
            SecretString::from("session-secret"),
            SecretString::from("ab".repeat(32)),
        );
        Ok(Arc::new(AuthState::from_globals(
            AuthConfig::new("https://custos.dev".to_string()),
            &globals,
        )?))
    }

    #[test]
    fn parse_user_id_accepts_uuid() {
        let id = Uuid::new_v4();
        assert!(parse_user_id(&id.to_string()).is_ok());
        assert!(parse_user_id(&format!(" {id} ")).is_ok());
    }

    #[test]
    fn parse_user_id_rejects_garbage() {
        assert!(parse_user_id("not-a-uuid").is_err());
        assert!(parse_user_id("").is_err());
    }

    #[tokio::test]
    async fn list_users_requires_session() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = list_users(HeaderMap::new(), Extension(pool), Extension(auth_state()?))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn delete_user_requires_session() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = delete_user(
            Path(Uuid::new_v4().to_string()),
            HeaderMap::new(),
            Extension(pool),
            Extension(auth_state()?),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
