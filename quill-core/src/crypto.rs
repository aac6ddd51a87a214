//! Password hashing and reset token handling
//!
//! Passwords are hashed with `password_auth` (Argon2id, PHC string format).
//!
//! Reset tokens are high-entropy random values, so only their SHA256 digest is
//! stored. A leaked `users` table therefore does not leak usable reset links,
//! and lookups can be done by digest.

use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

/// Hash a password for storage.
pub fn hash_password(password: &str) -> String {
    password_auth::generate_hash(password)
}

/// Check a password against a stored hash.
///
/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    password_auth::verify_password(password, hash).is_ok()
}

/// Generate a cryptographically secure random token.
///
/// 256 bits from the OS RNG, encoded as URL-safe base64 without padding
/// (43 characters), so it can be dropped into a reset link as is.
pub fn generate_secure_token() -> Result<String, CryptoError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::Random(e.to_string()))?;
    Ok(base64::Engine::encode(
        &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        bytes,
    ))
}

/// Hex-encoded SHA256 digest of a token, used as its storage and lookup key.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
