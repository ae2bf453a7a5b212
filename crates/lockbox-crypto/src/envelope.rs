//! Password-based envelope encryption for vault payloads
//!
//! Blob format (binary):
//! ```text
//! [16 bytes: random salt][12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! ```
//!
//! The key is re-derived from the embedded salt on decrypt. No associated
//! data is bound; a blob is self-contained.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use secrecy::SecretString;
use std::path::Path;

use crate::error::CryptoError;
use crate::kdf::derive_envelope_key;
use crate::{HEADER_SIZE, NONCE_SIZE, SALT_SIZE};

/// Seal `plaintext` under a key derived from `password`.
///
/// Returns `salt || nonce || ciphertext || tag`. Two calls with the same
/// input never produce the same blob.
pub fn encrypt(plaintext: &[u8], password: &SecretString) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.try_fill_bytes(&mut salt)?;
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.try_fill_bytes(&mut nonce_bytes)?;

    let key = derive_envelope_key(password, &salt);
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::PlaintextTooLarge)?;

    let mut blob = Vec::with_capacity(HEADER_SIZE + sealed.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

/// Open a blob produced by [`encrypt`].
pub fn decrypt(blob: &[u8], password: &SecretString) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < SALT_SIZE {
        return Err(CryptoError::MalformedBlob("too short for salt"));
    }
    if blob.len() < HEADER_SIZE {
        return Err(CryptoError::MalformedBlob("too short for nonce"));
    }

    let (salt, rest) = blob.split_at(SALT_SIZE);
    let (nonce_bytes, sealed) = rest.split_at(NONCE_SIZE);

    let key = derive_envelope_key(password, salt);
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), sealed)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Read a whole file and seal its contents.
pub fn encrypt_file(path: &Path, password: &SecretString) -> Result<Vec<u8>, CryptoError> {
    let plaintext = std::fs::read(path).map_err(|source| CryptoError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), bytes = plaintext.len(), "encrypting file");
    encrypt(&plaintext, password)
}
