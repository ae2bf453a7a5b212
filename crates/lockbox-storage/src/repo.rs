//! Repository capabilities consumed by the server's services

use async_trait::async_trait;
use lockbox_core::types::{NewVaultRecord, RecordId, User, UserId, VaultRecord};

use crate::error::StoreResult;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Cheap liveness probe
    async fn ping(&self) -> StoreResult<()>;

    /// Fails with `UserExists` if `login` is taken.
    async fn create_user(&self, login: &str, password_hash: &str) -> StoreResult<User>;

    async fn user_by_login(&self, login: &str) -> StoreResult<User>;

    async fn user_by_id(&self, id: UserId) -> StoreResult<User>;

    async fn update_password(&self, id: UserId, password_hash: &str) -> StoreResult<()>;

    /// Stamp `last_login_at`
    async fn record_login(&self, id: UserId) -> StoreResult<()>;
}

#[async_trait]
pub trait VaultRepository: Send + Sync {
    /// Assigns id, `version = 1`, timestamps and `active = true`.
    /// Returns the stored record's summary; the payload is not echoed.
    async fn insert(&self, record: NewVaultRecord) -> StoreResult<VaultRecord>;

    /// Active records of `user_id`, newest first.
    async fn list_active(&self, user_id: UserId) -> StoreResult<Vec<VaultRecord>>;

    /// Any record by id, active or not.
    async fn get(&self, id: RecordId) -> StoreResult<VaultRecord>;

    /// Soft delete: `active = false`, version bumped, `updated_at` refreshed.
    async fn deactivate(&self, id: RecordId) -> StoreResult<VaultRecord>;
}
