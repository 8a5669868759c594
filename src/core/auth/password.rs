//! Credential verification
//!
//! The session manager treats password hashing as an opaque one-way function
//! behind [`CredentialVerifier`]. The production implementation uses bcrypt.

/// Default cost factor for bcrypt hashing (12 is recommended for production)
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Credential hashing errors
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    HashingError(String),
}

/// Hashes secrets at registration and verifies them at sign-in
pub trait CredentialVerifier: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, PasswordError>;

    /// `Ok(false)` for a wrong secret; `Err` only when the hash is unusable
    fn verify(&self, secret: &str, hash: &str) -> Result<bool, PasswordError>;
}

/// bcrypt with automatic salt generation
#[derive(Debug, Clone, Copy)]
pub struct BcryptVerifier {
    cost: u32,
}

impl BcryptVerifier {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl CredentialVerifier for BcryptVerifier {
    fn hash(&self, secret: &str) -> Result<String, PasswordError> {
        bcrypt::hash(secret, self.cost).map_err(|e| PasswordError::HashingError(e.to_string()))
    }

    fn verify(&self, secret: &str, hash: &str) -> Result<bool, PasswordError> {
        bcrypt::verify(secret, hash).map_err(|e| PasswordError::HashingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimum cost keeps the tests fast
    fn verifier() -> BcryptVerifier {
        BcryptVerifier::new(4)
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = verifier().hash("p1").unwrap();

        assert_ne!(hash, "p1");
        assert!(verifier().verify("p1", &hash).unwrap());
        assert!(!verifier().verify("p2", &hash).unwrap());
    }

    #[test]
    fn test_hash_is_salted() {
        let first = verifier().hash("same").unwrap();
        let second = verifier().hash("same").unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_with_garbage_hash_is_an_error() {
        let result = verifier().verify("p1", "not-a-bcrypt-hash");
        assert!(matches!(result, Err(PasswordError::HashingError(_))));
    }

    #[test]
    fn test_default_cost() {
        assert_eq!(BcryptVerifier::default().cost, DEFAULT_BCRYPT_COST);
    }
}
