//! # Custos (Account & Authentication Service)
//!
//! `custos` is a user-account and authentication backend. It handles
//! registration, password login with a device-trust gated email code
//! challenge, JWT session cookies, email verification, password
//! reset/change, and role-based user management.
//!
//! ## Ephemeral tokens
//!
//! Every pending secret (email-verification link, password-reset link,
//! two-factor login code) is one purpose-tagged row in `ephemeral_tokens`
//! with an expiry. Issuing a new token for the same account and purpose
//! supersedes the previous one. Expiry is evaluated lazily at lookup time;
//! there is no background sweeper.
//!
//! - **Link secrets** (verification/reset) are bearer values delivered by
//!   email; only a SHA-256 digest is stored.
//! - **Login codes** must be compared against typed input and re-sent on
//!   request, so they are stored encrypted (ChaCha20-Poly1305) rather than
//!   hashed.
//!
//! ## Device trust
//!
//! A login from a user-agent the account has seen before goes straight to a
//! session. An unknown user-agent triggers the email code challenge;
//! redeeming the code adds the agent to the account's trusted set.
//!
//! ## Email
//!
//! Outbound mail goes through a transactional outbox table polled by a
//! background worker, so token issuance never depends on delivery.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
