//! Login password hashing: Argon2id PHC strings
//!
//! Unrelated to the envelope key: login hashes live on the server, vault
//! keys are derived on the client and never leave it.

use argon2::{
    password_hash::{
        rand_core::OsRng, Error as PhcError, PasswordHash, PasswordHasher, PasswordVerifier,
        SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

use crate::error::CryptoError;

/// One-way hash/verify capability for login credentials.
pub trait PasswordDigest: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, CryptoError>;

    /// `Ok(false)` for a mismatch; `Err` only when `hash` is unparseable.
    fn verify(&self, password: &str, hash: &str) -> Result<bool, CryptoError>;
}

/// Argon2id with configurable cost parameters
#[derive(Debug, Clone, Default)]
pub struct Argon2Digest {
    params: Params,
}

impl Argon2Digest {
    pub fn new(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> Result<Self, CryptoError> {
        let params = Params::new(mem_cost_kib, time_cost, parallelism, None)
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;
        Ok(Self { params })
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordDigest for Argon2Digest {
    fn hash(&self, password: &str) -> Result<String, CryptoError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| CryptoError::PasswordHash(e.to_string()))?;
        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, CryptoError> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| CryptoError::PasswordHash(e.to_string()))?;
        // cost parameters come from the PHC string, not from self
        match self.hasher().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PhcError::Password) => Ok(false),
            Err(e) => Err(CryptoError::PasswordHash(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Argon2Digest {
        Argon2Digest::new(1024, 1, 1).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let digest = fast();
        let hash = digest.hash("secret123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(digest.verify("secret123", &hash).unwrap());
        assert!(!digest.verify("secret124", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let digest = fast();
        assert_ne!(digest.hash("pw-123").unwrap(), digest.hash("pw-123").unwrap());
    }

    #[test]
    fn test_verify_uses_embedded_params() {
        let hash = fast().hash("secret123").unwrap();
        let other = Argon2Digest::new(2048, 2, 1).unwrap();
        assert!(other.verify("secret123", &hash).unwrap());
    }

    #[test]
    fn test_garbage_hash_is_error() {
        assert!(matches!(
            fast().verify("x", "not-a-phc-string"),
            Err(CryptoError::PasswordHash(_))
        ));
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(matches!(Argon2Digest::new(1, 0, 0), Err(CryptoError::Kdf(_))));
    }
}
