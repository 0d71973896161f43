use crate::{api, cli::globals::GlobalArgs};
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub code_key: SecretString,
    pub frontend_base_url: String,
    pub email_token_ttl_seconds: i64,
    pub login_code_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub email_from: String,
    pub email_reply_to: String,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
    pub email_outbox_backoff_base_seconds: u64,
    pub email_outbox_backoff_max_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let globals = GlobalArgs::new(args.jwt_secret, args.code_key);

    let auth_config = api::handlers::auth::AuthConfig::new(args.frontend_base_url)
        .with_email_token_ttl_seconds(args.email_token_ttl_seconds)
        .with_login_code_ttl_seconds(args.login_code_ttl_seconds)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_email_from(args.email_from)
        .with_email_reply_to(args.email_reply_to);

    let email_config = api::email::EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts)
        .with_backoff_base_seconds(args.email_outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.email_outbox_backoff_max_seconds);

    api::new(args.port, args.dsn, &globals, auth_config, email_config).await
}
