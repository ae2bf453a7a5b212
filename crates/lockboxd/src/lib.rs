//! lockboxd: Lockbox vault server
//!
//! Layers, outermost first:
//! ```text
//! CatchPanicLayer  → panics become Status::internal("internal error")
//! AuthLayer        → bearer token check, binds AuthenticatedUser
//! tonic LockboxServer → LockboxImpl → UserService / VaultService → storage
//! ```

pub mod daemon;
pub mod grpc;
pub mod interceptor;
pub mod metrics;
pub mod service;
pub mod session;

pub use grpc::{LockboxImpl, ServiceSettings};
pub use interceptor::{AuthLayer, AuthenticatedUser};
pub use session::{Authenticator, Claims, JwtAuthenticator, TokenError};
