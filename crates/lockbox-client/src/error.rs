use lockbox_core::LockboxError;
use lockbox_crypto::CryptoError;
use thiserror::Error;
use tonic::{Code, Status};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("server returned {}: {}", .0.code(), .0.message())]
    Status(Status),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("not authenticated: {0}")]
    NotAuthenticated(&'static str),

    #[error("call cancelled: deadline exceeded")]
    Cancelled,

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ClientError {
    /// gRPC code of a server-side failure, if this is one
    pub fn code(&self) -> Option<Code> {
        match self {
            ClientError::Status(status) => Some(status.code()),
            _ => None,
        }
    }
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        match status.code() {
            Code::Cancelled | Code::DeadlineExceeded => ClientError::Cancelled,
            _ => ClientError::Status(status),
        }
    }
}

impl From<LockboxError> for ClientError {
    fn from(e: LockboxError) -> Self {
        ClientError::Protocol(e.to_string())
    }
}
