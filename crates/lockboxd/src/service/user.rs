//! Account lifecycle: register, login, change password, health

use lockbox_core::types::{User, UserId};
use lockbox_core::validation::{validate_change_password, validate_login, validate_registration};
use lockbox_crypto::PasswordDigest;
use lockbox_storage::{StoreError, UserRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::ServiceError;

/// Bound on the storage ping behind the public health call
const PING_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserRepository>,
    digest: Arc<dyn PasswordDigest>,
}

impl UserService {
    pub fn new(store: Arc<dyn UserRepository>, digest: Arc<dyn PasswordDigest>) -> Self {
        Self { store, digest }
    }

    pub async fn register(&self, login: &str, password: &str) -> Result<User, ServiceError> {
        validate_registration(login, password)?;

        let hash = self.hash(password).await?;
        let user = self.store.create_user(login, &hash).await?;
        info!(user_id = user.id, "user registered");
        Ok(user)
    }

    /// Unknown login and wrong password are reported identically.
    pub async fn login(&self, login: &str, password: &str) -> Result<User, ServiceError> {
        validate_login(login, password)?;

        let user = match self.store.user_by_login(login).await {
            Ok(user) => user,
            Err(StoreError::UserNotFound) => {
                warn!("login for unknown account");
                return Err(ServiceError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };
        if !self.verify(password, &user.password_hash).await? {
            warn!(user_id = user.id, "login with wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        self.store.record_login(user.id).await?;
        info!(user_id = user.id, "user logged in");
        Ok(user)
    }

    pub async fn change_password(
        &self,
        user_id: UserId,
        current: &str,
        new: &str,
    ) -> Result<(), ServiceError> {
        validate_change_password(current, new)?;
        if current == new {
            return Err(ServiceError::PasswordNotChanged);
        }

        let user = self.store.user_by_id(user_id).await?;
        if !self.verify(current, &user.password_hash).await? {
            warn!(user_id, "password change with wrong current password");
            return Err(ServiceError::InvalidCredentials);
        }

        let hash = self.hash(new).await?;
        self.store.update_password(user_id, &hash).await?;
        info!(user_id, "password changed");
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), ServiceError> {
        lockbox_storage::check_health(self.store.as_ref(), PING_TIMEOUT).await?;
        Ok(())
    }

    // hashing is CPU-bound, keep it off the async workers
    async fn hash(&self, password: &str) -> Result<String, ServiceError> {
        let digest = self.digest.clone();
        let password = password.to_owned();
        Ok(tokio::task::spawn_blocking(move || digest.hash(&password)).await??)
    }

    async fn verify(&self, password: &str, hash: &str) -> Result<bool, ServiceError> {
        let digest = self.digest.clone();
        let password = password.to_owned();
        let hash = hash.to_owned();
        Ok(tokio::task::spawn_blocking(move || digest.verify(&password, &hash)).await??)
    }
}
