//! Random identifiers and refresh token hashing.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::{RngCore, rng};
use sha2::{Digest, Sha256};

/// Prefix of every device ID.
pub const DEVICE_ID_PREFIX: &str = "dev_";

/// `len` random bytes, URL-safe base64 without padding.
pub fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `dev_` followed by 22 characters (16 random bytes).
pub fn new_device_id() -> String {
    format!("{DEVICE_ID_PREFIX}{}", random_token(16))
}

/// Opaque refresh token (32 random bytes).
pub fn new_refresh_token() -> String {
    random_token(32)
}

/// SHA-256 hash a refresh token for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
