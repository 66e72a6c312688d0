//! Password hashing
//!
//! New records are bcrypt hashes (`$2b$...`, salt embedded). Bare 64-char hex
//! digests (unsalted SHA-256) are still accepted on login so accounts created
//! by the older scheme keep working.
//!
//! Both functions are CPU-bound; async callers run them on the blocking pool.

use sha2::{Digest, Sha256};

use crate::Result;

/// Work factor for new hashes
pub const HASH_COST: u32 = bcrypt::DEFAULT_COST;

/// Unsalted SHA-256 of the password as lowercase hex.
pub fn legacy_digest(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

/// Hash a password for storage.
pub fn hash_password(password: &str) -> Result<String> {
    Ok(bcrypt::hash(password, HASH_COST)?)
}

/// Check a password against a stored hash in either format.
///
/// A malformed stored hash never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if is_legacy_digest(stored) {
        return legacy_digest(password) == stored.to_ascii_lowercase();
    }
    bcrypt::verify(password, stored).unwrap_or(false)
}

fn is_legacy_digest(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}
