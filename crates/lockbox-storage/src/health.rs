//! Storage health check

use std::time::Duration;

use crate::error::{StoreError, StoreResult};
use crate::repo::UserRepository;

/// Ping the store, giving up after `timeout`
pub async fn check_health(store: &dyn UserRepository, timeout: Duration) -> StoreResult<()> {
    tokio::time::timeout(timeout, store.ping())
        .await
        .map_err(|_| StoreError::Unavailable(format!("ping timed out after {timeout:?}")))?
}

