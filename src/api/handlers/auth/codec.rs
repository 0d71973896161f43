//! Secret handling for ephemeral tokens.
//!
//! Link secrets (verification/reset) are bearer values: only a SHA-256
//! digest is stored, since the server never needs the original back. Login
//! codes must be compared against typed input and re-sent on request, so
//! they are encrypted with a server-held key instead of hashed.

use anyhow::{Context, Result, anyhow};
use base64::{Engine, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{Rng, RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const NONCE_LEN: usize = 12;

/// One-way digest used to store link secrets at rest, lowercase hex.
#[must_use]
pub fn hash_secret(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Create the raw secret embedded in verification/reset links.
///
/// The returned value is only sent to the user; the database stores
/// `hash_secret` of it. The account id suffix ties the link to one account.
///
/// # Errors
/// Returns an error if the system RNG fails.
pub fn generate_link_secret(user_id: Uuid) -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate link secret")?;
    let mut raw = String::with_capacity(bytes.len() * 2 + 36);
    for byte in bytes {
        raw.push_str(&format!("{byte:02x}"));
    }
    raw.push_str(&user_id.to_string());
    Ok(raw)
}

/// Random 6-digit login code, uniform in [100000, 999999].
#[must_use]
pub fn generate_login_code() -> String {
    let code: u32 = OsRng.gen_range(100_000..=999_999);
    code.to_string()
}

/// Reversible encryption for login codes.
///
/// Output is `base64(nonce (12 bytes) || ciphertext)`. A fresh nonce is
/// drawn per encryption, so the same code encrypts to different payloads.
#[derive(Clone)]
pub struct LoginCodeCodec {
    key: [u8; 32],
}

impl LoginCodeCodec {
    /// Build a codec from a 64-hex-character key.
    ///
    /// # Errors
    /// Returns an error if the key is not 32 hex-encoded bytes.
    pub fn from_hex_key(hex_key: &str) -> Result<Self> {
        let trimmed = hex_key.trim();
        if trimmed.len() != 64 {
            return Err(anyhow!("login-code key must be 64 hex characters"));
        }
        let mut key = [0u8; 32];
        for (index, chunk) in trimmed.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).context("invalid key encoding")?;
            key[index] =
                u8::from_str_radix(pair, 16).context("login-code key must be hexadecimal")?;
        }
        Ok(Self { key })
    }

    /// Encrypt a login code for at-rest storage.
    ///
    /// # Errors
    /// Returns an error if encryption fails.
    pub fn encrypt(&self, code: &str) -> Result<String> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, code.as_bytes())
            .map_err(|e| anyhow!("encryption failure: {e}"))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(STANDARD.encode(combined))
    }

    /// Decrypt a stored login code.
    ///
    /// # Errors
    /// Returns an error if the payload is malformed, tampered with, or was
    /// encrypted under a different key.
    pub fn decrypt(&self, payload: &str) -> Result<String> {
        let data = STANDARD
            .decode(payload.as_bytes())
            .context("invalid login-code payload encoding")?;
        if data.len() < NONCE_LEN {
            return Err(anyhow!("invalid login-code payload length"));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| anyhow!("decryption failure: {e}"))?;

        String::from_utf8(plaintext).context("login code is not valid UTF-8")
    }
}

impl std::fmt::Debug for LoginCodeCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCodeCodec").field("key", &"***").finish()
    }
}
