use thiserror::Error;

use crate::validation::ValidationErrors;

pub type LockboxResult<T> = Result<T, LockboxError>;

#[derive(Debug, Error)]
pub enum LockboxError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("unknown data type: {0:?}")]
    UnknownDataType(String),

    #[error("malformed timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}
