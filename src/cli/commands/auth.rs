use anyhow::Result;
use clap::{Arg, ArgMatches, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL used for verification and reset links")
                .env("CUSTOS_FRONTEND_BASE_URL")
                .default_value("https://custos.dev"),
        )
        .arg(
            Arg::new("email-token-ttl-seconds")
                .long("email-token-ttl-seconds")
                .help("Verification and reset token TTL in seconds")
                .env("CUSTOS_EMAIL_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("login-code-ttl-seconds")
                .long("login-code-ttl-seconds")
                .help("Two-factor login code TTL in seconds")
                .env("CUSTOS_LOGIN_CODE_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Session cookie and JWT TTL in seconds")
                .env("CUSTOS_SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
}

/// Parsed auth-related options.
#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub email_token_ttl_seconds: i64,
    pub login_code_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
}

impl Options {
    /// Extract auth options from CLI matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing (should not happen
    /// with clap defaults in place).
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>("frontend-base-url")
            .cloned()
            .unwrap_or_else(|| "https://custos.dev".to_string());
        let email_token_ttl_seconds = matches
            .get_one::<i64>("email-token-ttl-seconds")
            .copied()
            .unwrap_or(3600);
        let login_code_ttl_seconds = matches
            .get_one::<i64>("login-code-ttl-seconds")
            .copied()
            .unwrap_or(3600);
        let session_ttl_seconds = matches
            .get_one::<i64>("session-ttl-seconds")
            .copied()
            .unwrap_or(86400);

        Ok(Self {
            frontend_base_url,
            email_token_ttl_seconds,
            login_code_ttl_seconds,
            session_ttl_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied() -> Result<()> {
        let command = crate::cli::commands::new();
        let matches = command.get_matches_from(vec![
            "custos",
            "--dsn",
            "postgres://localhost/custos",
            "--jwt-secret",
            "secret",
            "--code-key",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        ]);
        let options = Options::parse(&matches)?;
        assert_eq!(options.frontend_base_url, "https://custos.dev");
        assert_eq!(options.email_token_ttl_seconds, 3600);
        assert_eq!(options.login_code_ttl_seconds, 3600);
        assert_eq!(options.session_ttl_seconds, 86400);
        Ok(())
    }

    #[test]
    fn overrides_applied() -> Result<()> {
        let command = crate::cli::commands::new();
        let matches = command.get_matches_from(vec![
            "custos",
            "--dsn",
            "postgres://localhost/custos",
            "--jwt-secret",
            "secret",
            "--code-key",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "--frontend-base-url",
            "https://app.example.test",
            "--email-token-ttl-seconds",
            "120",
            "--login-code-ttl-seconds",
            "300",
            "--session-ttl-seconds",
            "7200",
        ]);
        let options = Options::parse(&matches)?;
        assert_eq!(options.frontend_base_url, "https://app.example.test");
        assert_eq!(options.email_token_ttl_seconds, 120);
        assert_eq!(options.login_code_ttl_seconds, 300);
        assert_eq!(options.session_ttl_seconds, 7200);
        Ok(())
    }
}
