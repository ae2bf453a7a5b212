//! lockbox-crypto: client-side envelope encryption for vault payloads
//!
//! Every payload is sealed under a key derived from the user's vault
//! password and a fresh salt, so no key material is ever stored:
//! ```text
//! password ──PBKDF2-HMAC-SHA256(salt, 4096 rounds)──▶ 256-bit key
//! key + random 96-bit nonce ──AES-256-GCM──▶ ciphertext || tag
//! blob = salt(16) || nonce(12) || ciphertext || tag(16)
//! ```
//!
//! Login passwords are a separate concern: the server stores only an
//! Argon2id PHC hash of them (see [`password`]).

pub mod envelope;
pub mod error;
pub mod kdf;
pub mod password;

pub use envelope::{decrypt, encrypt, encrypt_file};
pub use error::CryptoError;
pub use kdf::{derive_envelope_key, EnvelopeKey};
pub use password::{Argon2Digest, PasswordDigest};

/// Size of a derived AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of the per-blob random salt
pub const SALT_SIZE: usize = 16;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Bytes preceding the sealed payload in every blob
pub const HEADER_SIZE: usize = SALT_SIZE + NONCE_SIZE;

/// PBKDF2 iteration count
pub const PBKDF2_ROUNDS: u32 = 4096;
