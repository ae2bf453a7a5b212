//! Business logic behind the gRPC handlers
//!
//! Handlers resolve the caller and convert wire types; services validate,
//! enforce ownership and talk to storage.

pub mod error;
pub mod user;
pub mod vault;

pub use error::ServiceError;
pub use user::UserService;
pub use vault::VaultService;
