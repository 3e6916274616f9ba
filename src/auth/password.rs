//! Credential hashing for local accounts.
//!
//! Stored hashes are PHC strings (argon2id, library defaults) so the parameters travel with
//! each hash. Reset tokens are compared in constant time.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use subtle::ConstantTimeEq;

use crate::errors::AppError;

/// Hash an account password with a fresh salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Could not hash password: {e}")))?;
    Ok(hash.to_string())
}

/// Check a sign-in password against the stored hash.
///
/// A mismatch is `Ok(false)`; only a corrupt stored hash is an error.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, AppError> {
    let stored = PasswordHash::new(stored)
        .map_err(|e| AppError::Internal(format!("Stored password hash is corrupt: {e}")))?;
    let matches = Argon2::default()
        .verify_password(password.as_bytes(), &stored)
        .is_ok();
    Ok(matches)
}

pub fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
