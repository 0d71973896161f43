//! Auth configuration and shared state.

use secrecy::ExposeSecret;

use super::codec::LoginCodeCodec;
use super::session::SessionKeys;
use crate::cli::globals::GlobalArgs;
use anyhow::Result;

const DEFAULT_EMAIL_TOKEN_TTL_SECONDS: i64 = 3600;
const DEFAULT_LOGIN_CODE_TTL_SECONDS: i64 = 3600;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 86400;
const DEFAULT_EMAIL_FROM: &str = "no-reply@custos.dev";
const DEFAULT_EMAIL_REPLY_TO: &str = "support@custos.dev";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    email_token_ttl_seconds: i64,
    login_code_ttl_seconds: i64,
    session_ttl_seconds: i64,
    email_from: String,
    email_reply_to: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            email_token_ttl_seconds: DEFAULT_EMAIL_TOKEN_TTL_SECONDS,
            login_code_ttl_seconds: DEFAULT_LOGIN_CODE_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            email_from: DEFAULT_EMAIL_FROM.to_string(),
            email_reply_to: DEFAULT_EMAIL_REPLY_TO.to_string(),
        }
    }

    #[must_use]
    pub fn with_email_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.email_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_login_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.login_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_email_from(mut self, from: String) -> Self {
        self.email_from = from;
        self
    }

    #[must_use]
    pub fn with_email_reply_to(mut self, reply_to: String) -> Self {
        self.email_reply_to = reply_to;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn email_token_ttl_seconds(&self) -> i64 {
        self.email_token_ttl_seconds
    }

    pub(super) fn login_code_ttl_seconds(&self) -> i64 {
        self.login_code_ttl_seconds
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(super) fn email_from(&self) -> &str {
        &self.email_from
    }

    pub(super) fn email_reply_to(&self) -> &str {
        &self.email_reply_to
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Shared auth state: configuration, login-code codec, and session keys.
pub struct AuthState {
    config: AuthConfig,
    codec: LoginCodeCodec,
    session: SessionKeys,
}

impl AuthState {
    /// Build the state from configuration and server-held secrets.
    ///
    /// # Errors
    /// Returns an error if the login-code key is malformed.
    pub fn from_globals(config: AuthConfig, globals: &GlobalArgs) -> Result<Self> {
        let codec = LoginCodeCodec::from_hex_key(globals.code_key.expose_secret())?;
        let session = SessionKeys::new(globals.jwt_secret.expose_secret());
        Ok(Self {
            config,
            codec,
            session,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn codec(&self) -> &LoginCodeCodec {
        &self.codec
    }

    pub(crate) fn session(&self) -> &SessionKeys {
        &self.session
    }
}
