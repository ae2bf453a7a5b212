//! Key derivation: PBKDF2-HMAC-SHA256 password → envelope key

use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{KEY_SIZE, PBKDF2_ROUNDS};

/// A 256-bit AES key derived for a single blob.
///
/// Zeroized on drop to prevent secrets lingering in memory.
pub struct EnvelopeKey {
    bytes: [u8; KEY_SIZE],
}

impl EnvelopeKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for EnvelopeKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for EnvelopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the envelope key for `salt`. Deterministic for a given
/// password and salt; CPU-bound, so async callers should run it off the
/// runtime threads.
pub fn derive_envelope_key(password: &SecretString, salt: &[u8]) -> EnvelopeKey {
    let mut bytes = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        password.expose_secret().as_bytes(),
        salt,
        PBKDF2_ROUNDS,
        &mut bytes,
    );
    EnvelopeKey { bytes }
}
