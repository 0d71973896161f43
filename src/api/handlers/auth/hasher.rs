//! Password hashing seam (argon2 PHC strings).

use anyhow::{Result, anyhow};
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};

/// Hash a raw password for storage.
///
/// # Errors
/// Returns an error if hashing fails.
pub(crate) fn hash_password(raw: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(raw.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

/// Compare a raw password against a stored PHC hash.
///
/// Malformed stored hashes compare as false rather than erroring; they can
/// only come from operator interference and must not authenticate anyone.
#[must_use]
pub(crate) fn verify_password(raw: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(raw.as_bytes(), &parsed)
        .is_ok()
}
