//! lockbox-storage: repository traits + in-memory store with JSON snapshots

pub mod error;
pub mod health;
pub mod memory;
pub mod repo;

pub use error::{StoreError, StoreResult};
pub use health::check_health;
pub use memory::MemoryStore;
pub use repo::{UserRepository, VaultRepository};
