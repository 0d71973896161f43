//! Typed failures for account and token flows.
//!
//! Every flow returns `Result<T, AuthError>` and handlers stop at the first
//! failure; nothing continues past an error branch. Internal causes are
//! logged, never serialized into response bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("Email id already exists")]
    DuplicateEmail,
    #[error("User not found")]
    NotFound,
    #[error("Invalid or expired token, please restart login")]
    InvalidOrExpiredToken,
    #[error("Email already verified")]
    AlreadyVerified,
    #[error("Incorrect login code, please try again")]
    IncorrectLoginCode,
    #[error("Not authorized")]
    Unauthorized(&'static str),
    #[error("Failed to send email, use the resend option")]
    Delivery,
    #[error("login code decryption failed")]
    Decryption(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::InvalidOrExpiredToken
            | Self::AlreadyVerified
            | Self::IncorrectLoginCode => StatusCode::BAD_REQUEST,
            Self::DuplicateEmail => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Delivery => StatusCode::BAD_GATEWAY,
            Self::Decryption(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Validation(message) => message.clone(),
            Self::Unauthorized(message) => (*message).to_string(),
            Self::Decryption(err) => {
                // Key mismatch or corrupt ciphertext is a configuration fault.
                error!("Login code decryption failed: {err}");
                "Internal error".to_string()
            }
            Self::Internal(err) => {
                error!("Request failed: {err:?}");
                "Internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(
            AuthError::Validation("Missing payload".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::DuplicateEmail.status(), StatusCode::CONFLICT);
        assert_eq!(AuthError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthError::InvalidOrExpiredToken.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::AlreadyVerified.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AuthError::IncorrectLoginCode.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::Unauthorized("Not authorized, please login").status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn server_errors_map_to_5xx() {
        assert_eq!(AuthError::Delivery.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            AuthError::Decryption(anyhow::anyhow!("bad key")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AuthError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn internal_body_never_leaks_cause() {
        let response = AuthError::Internal(anyhow::anyhow!("connection refused")).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        let text = String::from_utf8_lossy(&body);
        assert!(!text.contains("connection refused"));
        assert_eq!(text, "Internal error");
    }

    #[tokio::test]
    async fn decryption_body_never_leaks_cause() {
        let response = AuthError::Decryption(anyhow::anyhow!("aead error")).into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        let text = String::from_utf8_lossy(&body);
        assert!(!text.contains("aead"));
    }
}
