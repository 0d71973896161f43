use clap::{Arg, Command};

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_CODE_KEY: &str = "code-key";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long("jwt-secret")
                .help("HMAC secret used to sign session tokens")
                .env("CUSTOS_JWT_SECRET")
                .required(true)
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_CODE_KEY)
                .long("code-key")
                .help("Login-code encryption key, 64 hex characters (32 bytes)")
                .env("CUSTOS_CODE_KEY")
                .required(true)
                .hide_env_values(true),
        )
}
