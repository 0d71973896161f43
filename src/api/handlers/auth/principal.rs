//! Session-cookie authentication for role-gated routes.

use axum::http::HeaderMap;
use sqlx::PgPool;
use uuid::Uuid;

use super::error::AuthError;
use super::session::extract_session_token;
use super::state::AuthState;
use super::storage::{Role, find_account_by_id};

/// The authenticated identity behind a request.
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    #[must_use]
    pub const fn is_author(&self) -> bool {
        matches!(self.role, Role::Author | Role::Admin)
    }
}

/// Resolve the session cookie into a principal.
///
/// # Errors
/// `Unauthorized` when the cookie is missing/invalid, the account is gone,
/// or the account is suspended.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    auth_state: &AuthState,
) -> Result<Principal, AuthError> {
    let token = extract_session_token(headers)
        .ok_or(AuthError::Unauthorized("Not authorized, please login"))?;
    let user_id = auth_state
        .session()
        .verify(&token)
        .ok_or(AuthError::Unauthorized("Not authorized, please login"))?;

    let account = find_account_by_id(pool, user_id)
        .await?
        .ok_or(AuthError::Unauthorized("Not authorized, please login"))?;

    if matches!(account.role, Role::Suspended) {
        return Err(AuthError::Unauthorized(
            "Account suspended, please contact support",
        ));
    }

    Ok(Principal {
        user_id: account.id,
        role: account.role,
    })
}

/// Admin-only gate.
///
/// # Errors
/// `Unauthorized` when the principal is not an admin.
pub(crate) fn require_admin(principal: &Principal) -> Result<(), AuthError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(AuthError::Unauthorized(
            "You are not authorized for this action",
        ))
    }
}

/// Author-or-admin gate.
///
/// # Errors
/// `Unauthorized` when the principal is a regular user.
pub(crate) fn require_author(principal: &Principal) -> Result<(), AuthError> {
    if principal.is_author() {
        Ok(())
    } else {
        Err(AuthError::Unauthorized(
            "You are not authorized for this action",
        ))
    }
}
