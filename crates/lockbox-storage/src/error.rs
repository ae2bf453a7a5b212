use lockbox_core::types::RecordId;
use std::path::PathBuf;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("login already taken: {0}")]
    UserExists(String),

    #[error("user not found")]
    UserNotFound,

    #[error("vault record {0} not found")]
    RecordNotFound(RecordId),

    #[error("persisting snapshot {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
