//! Password hashing and verification.

use rand::{thread_rng, Rng};

use crate::errors::{Error, Result};

/// bcrypt work factor. Hashing at this cost is slow by design; callers run it
/// on a blocking thread.
pub const BCRYPT_COST: u32 = 12;

/// Hash a password with bcrypt (salted, cost 12).
pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| Error::Internal {
        operation: format!("hash password: {e}"),
    })
}

/// Verify a password against a stored hash.
///
/// The salt and cost are embedded in the hash itself.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).map_err(|e| Error::Internal {
        operation: format!("verify password: {e}"),
    })
}

/// Generate a secure random token for password reset.
///
/// 32 bytes (256 bits) from a CSPRNG, hex-encoded. Deliberately not derived
/// from a counter or timestamp.
pub fn generate_reset_token() -> String {
    let mut token_bytes = [0u8; 32];
    thread_rng().fill(&mut token_bytes);

    hex::encode(token_bytes)
}
