//! Password hashing via bcrypt.

use super::AuthError;
use super::random::random_token;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
}

/// Hash of 32 random bytes for accounts created by an external login. Nobody
/// knows the preimage, so the account cannot log in with a password.
pub fn placeholder_password_hash() -> Result<String, AuthError> {
    hash_password(&random_token(32))
}
