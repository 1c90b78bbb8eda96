//! One-way password hashing.

use argon2::password_hash::{PasswordHash, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordVerifier, Version};
use rand_core::OsRng;
use thiserror::Error;

use gatehouse_core::DomainError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("invalid hasher parameters: {0}")]
    Params(String),
}

impl From<HashError> for DomainError {
    fn from(value: HashError) -> Self {
        DomainError::internal(value.to_string())
    }
}

/// Salted, computationally expensive one-way hash.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, HashError>;

    /// Returns `Ok(false)` for a mismatch, including a stored value that is
    /// not a hash at all (such as the OAuth placeholder).
    fn verify(&self, stored: &str, password: &str) -> Result<bool, HashError>;
}

/// Argon2id hasher producing PHC strings.
#[derive(Clone)]
pub struct Argon2PasswordHasher {
    argon2: Argon2<'static>,
}

impl Argon2PasswordHasher {
    /// Argon2id with the crate's recommended parameters.
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Argon2id with explicit cost parameters (memory in KiB).
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, HashError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| HashError::Params(e.to_string()))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl Default for Argon2PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, password: &str) -> Result<String, HashError> {
        use argon2::PasswordHasher as _;

        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| HashError::Hash(e.to_string()))
    }

    fn verify(&self, stored: &str, password: &str) -> Result<bool, HashError> {
        let Ok(parsed) = PasswordHash::new(stored) else {
            return Ok(false);
        };
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HashError::Hash(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fast_hasher;

    #[test]
    fn hash_is_not_the_plaintext_and_verifies() {
        let hasher = fast_hasher();
        let hash = hasher.hash("secret1").unwrap();

        assert_ne!(hash, "secret1");
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify(&hash, "secret1").unwrap());
        assert!(!hasher.verify(&hash, "secret2").unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let hasher = fast_hasher();
        let a = hasher.hash("secret1").unwrap();
        let b = hasher.hash("secret1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn non_hash_stored_value_never_verifies() {
        let hasher = fast_hasher();
        assert!(!hasher.verify("google_oauth_user", "google_oauth_user").unwrap());
        assert!(!hasher.verify("", "").unwrap());
    }

    #[test]
    fn verify_accepts_hashes_from_other_parameter_sets() {
        let cheap = fast_hasher();
        let hash = cheap.hash("secret1").unwrap();
        // PHC strings carry their own parameters.
        assert!(Argon2PasswordHasher::new().verify(&hash, "secret1").unwrap());
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(
            Argon2PasswordHasher::with_params(1, 0, 1),
            Err(HashError::Params(_))
        ));
    }
}
