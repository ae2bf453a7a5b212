pub mod config;
pub mod convert;
pub mod error;
pub mod types;
pub mod validation;

pub use error::{LockboxError, LockboxResult};

/// Generated gRPC types and service traits (from lockbox.proto)
pub mod proto {
    tonic::include_proto!("lockbox");
}
