//! Per-post / per-comment password hashing.
//!
//! Secrets are stored as Argon2 PHC strings (salt and cost parameters embedded), so the same
//! `verify` serves posts and comments regardless of when their hash was produced.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error("hashing failed: {0}")]
    Hash(String),
    #[error("stored hash is malformed: {0}")]
    MalformedHash(String),
}

pub fn hash_secret(secret: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

/// Returns `Ok(false)` on mismatch; `Err` only when the stored hash cannot be parsed.
pub fn verify(submitted: &str, stored_hash: &str) -> Result<bool, CredentialError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| CredentialError::MalformedHash(e.to_string()))?;
    if submitted.is_empty() {
        return Ok(false);
    }
    match Argon2::default().verify_password(submitted.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CredentialError::MalformedHash(e.to_string())),
    }
}
