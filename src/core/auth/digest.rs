//! One-way hashing of refresh tokens
//!
//! Refresh tokens are high-entropy JWTs, so a single SHA-256 pass is enough.
//! bcrypt is unsuitable here because it only looks at the first 72 bytes,
//! which for a JWT is mostly the shared header.

use sha2::{Digest, Sha256};

/// Hash a token using SHA-256, hex encoded
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check a presented token against a stored hash in constant time
pub fn verify_token_hash(token: &str, stored_hash: &str) -> bool {
    constant_time_eq(hash_token(token).as_bytes(), stored_hash.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
