use anyhow::Result;
use clap::{Arg, ArgMatches, Command};

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-from")
                .long("email-from")
                .help("From address for outbound email")
                .env("CUSTOS_EMAIL_FROM")
                .default_value("no-reply@custos.dev"),
        )
        .arg(
            Arg::new("email-reply-to")
                .long("email-reply-to")
                .help("Reply-To address for outbound email")
                .env("CUSTOS_EMAIL_REPLY_TO")
                .default_value("support@custos.dev"),
        )
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("CUSTOS_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("CUSTOS_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("CUSTOS_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("email-outbox-backoff-base-seconds")
                .long("email-outbox-backoff-base-seconds")
                .help("Base delay for email outbox retry backoff")
                .env("CUSTOS_EMAIL_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-backoff-max-seconds")
                .long("email-outbox-backoff-max-seconds")
                .help("Max delay for email outbox retry backoff")
                .env("CUSTOS_EMAIL_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

/// Parsed email delivery options.
#[derive(Debug)]
pub struct Options {
    pub from: String,
    pub reply_to: String,
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

impl Options {
    /// Extract email options from CLI matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing (should not happen
    /// with clap defaults in place).
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            from: matches
                .get_one::<String>("email-from")
                .cloned()
                .unwrap_or_else(|| "no-reply@custos.dev".to_string()),
            reply_to: matches
                .get_one::<String>("email-reply-to")
                .cloned()
                .unwrap_or_else(|| "support@custos.dev".to_string()),
            poll_seconds: matches
                .get_one::<u64>("email-outbox-poll-seconds")
                .copied()
                .unwrap_or(5),
            batch_size: matches
                .get_one::<usize>("email-outbox-batch-size")
                .copied()
                .unwrap_or(10),
            max_attempts: matches
                .get_one::<u32>("email-outbox-max-attempts")
                .copied()
                .unwrap_or(5),
            backoff_base_seconds: matches
                .get_one::<u64>("email-outbox-backoff-base-seconds")
                .copied()
                .unwrap_or(5),
            backoff_max_seconds: matches
                .get_one::<u64>("email-outbox-backoff-max-seconds")
                .copied()
                .unwrap_or(300),
        })
    }
}
