//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{auth, email, secrets};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    // Validate secret shapes that clap cannot express declaratively
    crate::cli::commands::validate(matches).map_err(|e| anyhow::anyhow!(e))?;

    let jwt_secret = matches
        .get_one::<String>(secrets::ARG_JWT_SECRET)
        .cloned()
        .context("missing required argument: --jwt-secret")?;
    let code_key = matches
        .get_one::<String>(secrets::ARG_CODE_KEY)
        .cloned()
        .context("missing required argument: --code-key")?;

    let auth_opts = auth::Options::parse(matches)?;
    let email_opts = email::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: SecretString::from(jwt_secret),
        code_key: SecretString::from(code_key),
        frontend_base_url: auth_opts.frontend_base_url,
        email_token_ttl_seconds: auth_opts.email_token_ttl_seconds,
        login_code_ttl_seconds: auth_opts.login_code_ttl_seconds,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        email_from: email_opts.from,
        email_reply_to: email_opts.reply_to,
        email_outbox_poll_seconds: email_opts.poll_seconds,
        email_outbox_batch_size: email_opts.batch_size,
        email_outbox_max_attempts: email_opts.max_attempts,
        email_outbox_backoff_base_seconds: email_opts.backoff_base_seconds,
        email_outbox_backoff_max_seconds: email_opts.backoff_max_seconds,
    }))
}
