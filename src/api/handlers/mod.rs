//! API handlers and shared utilities for Custos.
//!
//! This module organizes the service's route handlers and provides common
//! validation helpers used across auth flows.

pub mod auth;
pub mod health;
pub mod users;

use regex::Regex;

/// Lightweight email sanity check used by auth handlers before persisting data.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Passwords must be at least 8 characters.
#[must_use]
pub fn valid_password(password: &str) -> bool {
    password.trim().len() >= 8
}
