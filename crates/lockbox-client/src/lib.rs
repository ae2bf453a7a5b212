//! lockbox-client: talk to a lockbox server with client-side encryption
//!
//! ```text
//! SecretPayload ─json─▶ encrypt(vault password) ─▶ SaveVault
//! file ─▶ encrypt_file ─▶ split ─▶ UploadFile (metadata, chunk, chunk, ...)
//! GetStreamedVaults ─▶ StreamAssembler ─▶ decrypt per record
//! ```

pub mod error;
pub mod files;
pub mod payload;
pub mod session;

pub use error::ClientError;
pub use files::{file_metadata, format_file_size};
pub use payload::{Card, Credential, Note, SecretPayload};
pub use session::{FetchedRecord, LockboxSession, Timeouts};
