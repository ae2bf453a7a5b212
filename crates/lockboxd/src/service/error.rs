use lockbox_chunks::TransferError;
use lockbox_core::validation::ValidationErrors;
use lockbox_core::LockboxError;
use lockbox_crypto::CryptoError;
use lockbox_storage::StoreError;
use thiserror::Error;
use tonic::Status;
use tracing::error;

use crate::session::TokenError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    #[error("invalid login or password")]
    InvalidCredentials,

    #[error("new password must differ from the current one")]
    PasswordNotChanged,

    #[error("login already taken")]
    UserExists,

    #[error("vault record belongs to another user")]
    OwnerMismatch,

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(StoreError),

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UserExists(_) => ServiceError::UserExists,
            StoreError::UserNotFound => ServiceError::NotFound("user not found".into()),
            StoreError::RecordNotFound(id) => {
                ServiceError::NotFound(format!("vault record {id} not found"))
            }
            other => ServiceError::Store(other),
        }
    }
}

impl From<LockboxError> for ServiceError {
    fn from(e: LockboxError) -> Self {
        match e {
            LockboxError::Validation(v) => ServiceError::Validation(v),
            LockboxError::UnknownDataType(t) => ServiceError::Validation(
                ValidationErrors::single("data_type", format!("unknown data type {t:?}")),
            ),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(e: tokio::task::JoinError) -> Self {
        ServiceError::Internal(format!("blocking task failed: {e}"))
    }
}

impl From<ServiceError> for Status {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(v) => Status::invalid_argument(v.to_string()),
            ServiceError::InvalidCredentials => Status::unauthenticated(e.to_string()),
            ServiceError::PasswordNotChanged => Status::failed_precondition(e.to_string()),
            ServiceError::UserExists => Status::already_exists(e.to_string()),
            ServiceError::OwnerMismatch => Status::permission_denied(e.to_string()),
            ServiceError::NotFound(msg) => Status::not_found(msg),
            ServiceError::Transfer(TransferError::LimitExceeded { .. }) => {
                Status::resource_exhausted(e.to_string())
            }
            ServiceError::Transfer(t) => Status::invalid_argument(t.to_string()),
            // storage, crypto, token signing and the rest stay server-side
            other => {
                error!(error = %other, "request failed");
                Status::internal("internal error")
            }
        }
    }
}
