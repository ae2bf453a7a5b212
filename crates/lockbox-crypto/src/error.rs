use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("malformed blob: {0}")]
    MalformedBlob(&'static str),

    /// Wrong password and tampered data are deliberately indistinguishable.
    #[error("decryption failed: wrong password or corrupted data")]
    AuthenticationFailed,

    #[error("plaintext too large to seal")]
    PlaintextTooLarge,

    #[error("OS random source failed: {0}")]
    Entropy(#[from] rand::Error),

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid Argon2id params: {0}")]
    Kdf(String),

    #[error("password hash error: {0}")]
    PasswordHash(String),
}
