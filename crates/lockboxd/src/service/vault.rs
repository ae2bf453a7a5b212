//! Vault record lifecycle: save, list, deactivate

use lockbox_core::types::{NewVaultRecord, RecordId, UserId, VaultRecord};
use lockbox_core::validation::validate_new_record;
use lockbox_storage::VaultRepository;
use std::sync::Arc;
use tracing::{info, warn};

use super::ServiceError;

#[derive(Clone)]
pub struct VaultService {
    store: Arc<dyn VaultRepository>,
}

impl VaultService {
    pub fn new(store: Arc<dyn VaultRepository>) -> Self {
        Self { store }
    }

    /// Validate, then persist with a single insert.
    pub async fn save(&self, record: NewVaultRecord) -> Result<VaultRecord, ServiceError> {
        validate_new_record(record.user_id, &record.name)?;

        let bytes = record.encrypted_data.len();
        let saved = self.store.insert(record).await?;
        info!(
            user_id = saved.user_id,
            record_id = saved.id,
            data_type = %saved.data_type,
            bytes,
            "vault record saved"
        );
        Ok(saved)
    }

    /// Active records owned by `user_id`, newest first
    pub async fn list_by_owner(&self, user_id: UserId) -> Result<Vec<VaultRecord>, ServiceError> {
        Ok(self.store.list_active(user_id).await?)
    }

    pub async fn deactivate(
        &self,
        user_id: UserId,
        record_id: RecordId,
    ) -> Result<VaultRecord, ServiceError> {
        let record = self.store.get(record_id).await?;
        if record.user_id != user_id {
            warn!(user_id, record_id, "deactivate of another user's record");
            return Err(ServiceError::OwnerMismatch);
        }

        let updated = self.store.deactivate(record_id).await?;
        info!(user_id, record_id, version = updated.version, "vault record deactivated");
        Ok(updated)
    }
}
