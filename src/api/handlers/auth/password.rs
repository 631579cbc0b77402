//! Password hashing primitive: Argon2id with a per-call salt, stored as a
//! PHC string.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a plaintext password for storage.
pub(crate) fn hash(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?;
    Ok(hash.to_string())
}

/// Compare a plaintext password against a stored PHC string.
///
/// An unparseable stored hash is an error, not a mismatch; it means the
/// record is corrupt and the caller should log it.
pub(crate) fn matches(plaintext: &str, stored: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|err| anyhow!("invalid stored password hash: {err}"))
        .context("password comparison failed")?;
    Ok(Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok())
}
