//! In-memory store, optionally backed by a snapshot on disk
//!
//! All writes go through one `RwLock`. With a snapshot configured, every
//! write is persisted atomically (write temp file, then rename) before it
//! is acknowledged; if persisting fails the in-memory change is undone, so
//! callers never observe a write that is not on disk.
//!
//! Snapshot layout: a JSON index of users and record metadata at the
//! configured path, and one file per record payload under `<path>.blobs/`.
//! Payloads never change after insert, so a write costs one index flush
//! plus at most one new blob file.

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use lockbox_core::types::{NewVaultRecord, RecordId, User, UserId, VaultRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::repo::{UserRepository, VaultRepository};

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    last_user_id: UserId,
    last_record_id: RecordId,
    users: BTreeMap<UserId, User>,
    /// Record metadata; `encrypted_data` is always empty here
    records: BTreeMap<RecordId, VaultRecord>,
    #[serde(skip)]
    blobs: BTreeMap<RecordId, Vec<u8>>,
}

impl State {
    fn with_payload(&self, record: &VaultRecord) -> VaultRecord {
        let mut full = record.clone();
        full.encrypted_data = self.blobs.get(&record.id).cloned().unwrap_or_default();
        full
    }
}

/// Reverses one applied write
enum Undo {
    RemoveUser(UserId),
    RestoreUser(User),
    RemoveRecord(RecordId),
    RestoreRecord(VaultRecord),
}

impl Undo {
    /// Record whose payload must reach disk before the index
    fn new_record(&self) -> Option<RecordId> {
        match self {
            Undo::RemoveRecord(id) => Some(*id),
            _ => None,
        }
    }

    // ids are handed out sequentially under the write lock
    fn apply(self, state: &mut State) {
        match self {
            Undo::RemoveUser(id) => {
                state.users.remove(&id);
                state.last_user_id = id - 1;
            }
            Undo::RestoreUser(user) => {
                state.users.insert(user.id, user);
            }
            Undo::RemoveRecord(id) => {
                state.records.remove(&id);
                state.blobs.remove(&id);
                state.last_record_id = id - 1;
            }
            Undo::RestoreRecord(record) => {
                state.records.insert(record.id, record);
            }
        }
    }
}

pub struct MemoryStore {
    state: RwLock<State>,
    snapshot: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Volatile store; contents are lost on drop.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            snapshot: None,
        }
    }

    /// Store persisted at `path`, loading the existing snapshot if present.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let state = if path.exists() {
            let state = load(path).map_err(|source| StoreError::Persist {
                path: path.to_path_buf(),
                source,
            })?;
            info!(
                path = %path.display(),
                users = state.users.len(),
                records = state.records.len(),
                "snapshot loaded"
            );
            state
        } else {
            info!(path = %path.display(), "no snapshot yet, starting empty");
            State::default()
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshot: Some(path.to_path_buf()),
        })
    }

    /// Apply `f` under the write lock and persist the result. On persist
    /// failure the returned `Undo` restores the previous state.
    async fn write<T>(
        &self,
        f: impl FnOnce(&mut State) -> StoreResult<(T, Undo)>,
    ) -> StoreResult<T> {
        let mut guard = self.state.write().await;
        let (out, undo) = f(&mut guard)?;
        let Some(path) = self.snapshot.as_deref() else {
            return Ok(out);
        };

        let new_record = undo.new_record();
        if let Err(source) = persist(path, &guard, new_record).await {
            undo.apply(&mut guard);
            if let Some(id) = new_record {
                // the index never referenced it
                let _ = tokio::fs::remove_file(blob_path(path, id)).await;
            }
            return Err(StoreError::Persist {
                path: path.to_path_buf(),
                source,
            });
        }
        Ok(out)
    }
}

fn blob_dir(index: &Path) -> PathBuf {
    index.with_extension("blobs")
}

fn blob_path(index: &Path, id: RecordId) -> PathBuf {
    blob_dir(index).join(format!("{id}.bin"))
}

fn load(path: &Path) -> anyhow::Result<State> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot: {}", path.display()))?;
    let mut state: State = serde_json::from_str(&content)
        .with_context(|| format!("parsing snapshot: {}", path.display()))?;

    for id in state.records.keys() {
        let file = blob_path(path, *id);
        let blob = std::fs::read(&file)
            .with_context(|| format!("reading record payload: {}", file.display()))?;
        state.blobs.insert(*id, blob);
    }
    Ok(state)
}

async fn persist(path: &Path, state: &State, new_record: Option<RecordId>) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating snapshot dir: {}", parent.display()))?;
    }

    if let Some(id) = new_record {
        let dir = blob_dir(path);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating blob dir: {}", dir.display()))?;
        let blob = state.blobs.get(&id).map(Vec::as_slice).unwrap_or_default();
        write_atomic(&blob_path(path, id), blob).await?;
    }

    let json = serde_json::to_vec(state).context("serializing snapshot")?;
    write_atomic(path, &json).await?;

    debug!(path = %path.display(), bytes = json.len(), "snapshot flushed");
    Ok(())
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .with_context(|| format!("writing temp file: {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("renaming into place: {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        let _guard = self.state.read().await;
        Ok(())
    }

    async fn create_user(&self, login: &str, password_hash: &str) -> StoreResult<User> {
        self.write(|state| {
            if state.users.values().any(|u| u.login == login) {
                return Err(StoreError::UserExists(login.to_string()));
            }
            state.last_user_id += 1;
            let now = Utc::now();
            let user = User {
                id: state.last_user_id,
                login: login.to_string(),
                password_hash: password_hash.to_string(),
                created_at: now,
                updated_at: now,
                last_login_at: None,
                active: true,
            };
            state.users.insert(user.id, user.clone());
            Ok((user, Undo::RemoveUser(state.last_user_id)))
        })
        .await
    }

    async fn user_by_login(&self, login: &str) -> StoreResult<User> {
        let state = self.state.read().await;
        state
            .users
            .values()
            .find(|u| u.login == login && u.active)
            .cloned()
            .ok_or(StoreError::UserNotFound)
    }

    async fn user_by_id(&self, id: UserId) -> StoreResult<User> {
        let state = self.state.read().await;
        state
            .users
            .get(&id)
            .filter(|u| u.active)
            .cloned()
            .ok_or(StoreError::UserNotFound)
    }

    async fn update_password(&self, id: UserId, password_hash: &str) -> StoreResult<()> {
        self.write(|state| {
            let user = state.users.get_mut(&id).ok_or(StoreError::UserNotFound)?;
            let undo = Undo::RestoreUser(user.clone());
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
            Ok(((), undo))
        })
        .await
    }

    async fn record_login(&self, id: UserId) -> StoreResult<()> {
        self.write(|state| {
            let user = state.users.get_mut(&id).ok_or(StoreError::UserNotFound)?;
            let undo = Undo::RestoreUser(user.clone());
            user.last_login_at = Some(Utc::now());
            Ok(((), undo))
        })
        .await
    }
}

#[async_trait]
impl VaultRepository for MemoryStore {
    async fn insert(&self, record: NewVaultRecord) -> StoreResult<VaultRecord> {
        self.write(|state| {
            state.last_record_id += 1;
            let now = Utc::now();
            let stored = VaultRecord {
                id: state.last_record_id,
                user_id: record.user_id,
                name: record.name,
                data_type: record.data_type,
                encrypted_data: Vec::new(),
                meta_data: record.meta_data,
                version: 1,
                created_at: now,
                updated_at: now,
                active: true,
            };
            state.blobs.insert(stored.id, record.encrypted_data);
            state.records.insert(stored.id, stored.clone());
            Ok((stored, Undo::RemoveRecord(state.last_record_id)))
        })
        .await
    }

    async fn list_active(&self, user_id: UserId) -> StoreResult<Vec<VaultRecord>> {
        let state = self.state.read().await;
        let mut records: Vec<VaultRecord> = state
            .records
            .values()
            .filter(|r| r.user_id == user_id && r.active)
            .map(|r| state.with_payload(r))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn get(&self, id: RecordId) -> StoreResult<VaultRecord> {
        let state = self.state.read().await;
        state
            .records
            .get(&id)
            .map(|r| state.with_payload(r))
            .ok_or(StoreError::RecordNotFound(id))
    }

    async fn deactivate(&self, id: RecordId) -> StoreResult<VaultRecord> {
        self.write(|state| {
            let record = state
                .records
                .get_mut(&id)
                .ok_or(StoreError::RecordNotFound(id))?;
            let undo = Undo::RestoreRecord(record.clone());
            record.active = false;
            record.version += 1;
            record.updated_at = Utc::now();
            Ok((record.clone(), undo))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockbox_core::types::{DataType, Metadata};

    fn new_record(user_id: UserId, name: &str) -> NewVaultRecord {
        NewVaultRecord {
            user_id,
            name: name.into(),
            data_type: DataType::Text,
            encrypted_data: vec![1, 2, 3],
            meta_data: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_create_user_unique_login() {
        let store = MemoryStore::new();
        let alice = store.create_user("alice", "hash").await.unwrap();
        assert_eq!(alice.id, 1);
        assert!(matches!(
            store.create_user("alice", "other").await,
            Err(StoreError::UserExists(l)) if l == "alice"
        ));
        let bob = store.create_user("bob", "hash").await.unwrap();
        assert_eq!(bob.id, 2);
    }

    #[tokio::test]
    async fn test_user_lookup_and_password_update() {
        let store = MemoryStore::new();
        let user = store.create_user("alice", "h1").await.unwrap();
        store.update_password(user.id, "h2").await.unwrap();
        store.record_login(user.id).await.unwrap();

        let fetched = store.user_by_login("alice").await.unwrap();
        assert_eq!(fetched.password_hash, "h2");
        assert!(fetched.last_login_at.is_some());
        assert!(matches!(
            store.user_by_login("nobody").await,
            Err(StoreError::UserNotFound)
        ));
        assert!(matches!(
            store.update_password(99, "x").await,
            Err(StoreError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_insert_assigns_fields() {
        let store = MemoryStore::new();
        let r = store.insert(new_record(1, "n")).await.unwrap();
        assert_eq!(r.id, 1);
        assert_eq!(r.version, 1);
        assert!(r.active);
        assert_eq!(r.created_at, r.updated_at);
    }

    #[tokio::test]
    async fn test_list_newest_first_and_owner_scoped() {
        let store = MemoryStore::new();
        let first = store.insert(new_record(1, "first")).await.unwrap();
        store.insert(new_record(2, "other user")).await.unwrap();
        let second = store.insert(new_record(1, "second")).await.unwrap();

        let list = store.list_active(1).await.unwrap();
        let ids: Vec<RecordId> = list.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_deactivate_hides_record() {
        let store = MemoryStore::new();
        let r = store.insert(new_record(1, "gone")).await.unwrap();
        let after = store.deactivate(r.id).await.unwrap();
        assert!(!after.active);
        assert_eq!(after.version, 2);
        assert!(after.encrypted_data.is_empty());

        assert!(store.list_active(1).await.unwrap().is_empty());
        // still retrievable by id
        assert!(!store.get(r.id).await.unwrap().active);
        assert!(matches!(
            store.deactivate(42).await,
            Err(StoreError::RecordNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/vault.json");

        {
            let store = MemoryStore::open(&path).unwrap();
            store.create_user("alice", "hash").await.unwrap();
            store.insert(new_record(1, "kept")).await.unwrap();
        }
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.user_by_login("alice").await.unwrap().id, 1);
        let list = store.list_active(1).await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].encrypted_data, vec![1, 2, 3]);

        // ids keep counting from the snapshot
        let next = store.insert(new_record(1, "next")).await.unwrap();
        assert_eq!(next.id, 2);
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        // parent is a regular file, so create_dir_all fails
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let store = MemoryStore::open(&blocker.join("vault.json")).unwrap();

        assert!(matches!(
            store.insert(new_record(1, "lost")).await,
            Err(StoreError::Persist { .. })
        ));
        assert!(store.list_active(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_payloads_live_outside_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        let store = MemoryStore::open(&path).unwrap();
        let mut record = new_record(1, "big");
        record.encrypted_data = vec![0x5A; 4096];
        let saved = store.insert(record).await.unwrap();
        assert!(saved.encrypted_data.is_empty());

        let index = std::fs::read(&path).unwrap();
        assert!(index.len() < 1024, "index must not embed payloads");
        assert_eq!(std::fs::read(blob_path(&path, saved.id)).unwrap(), vec![0x5A; 4096]);
        assert_eq!(store.get(saved.id).await.unwrap().encrypted_data.len(), 4096);
    }

    #[tokio::test]
    async fn test_failed_write_undoes_only_that_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        let store = MemoryStore::open(&path).unwrap();
        let kept = store.insert(new_record(1, "kept")).await.unwrap();

        // a directory squatting on the temp name makes the next flush fail
        let blocker = path.with_extension("tmp");
        std::fs::create_dir(&blocker).unwrap();
        assert!(matches!(
            store.deactivate(kept.id).await,
            Err(StoreError::Persist { .. })
        ));
        let unchanged = store.get(kept.id).await.unwrap();
        assert!(unchanged.active);
        assert_eq!(unchanged.version, 1);
        assert_eq!(unchanged.encrypted_data, vec![1, 2, 3]);

        assert!(store.insert(new_record(1, "lost")).await.is_err());
        assert!(!blob_path(&path, kept.id + 1).exists());
        std::fs::remove_dir(&blocker).unwrap();

        // the failed insert released its id
        let next = store.insert(new_record(1, "next")).await.unwrap();
        assert_eq!(next.id, kept.id + 1);
        assert_eq!(store.list_active(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_payload_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        {
            let store = MemoryStore::open(&path).unwrap();
            store.insert(new_record(1, "n")).await.unwrap();
        }
        std::fs::remove_file(blob_path(&path, 1)).unwrap();
        assert!(matches!(
            MemoryStore::open(&path),
            Err(StoreError::Persist { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            MemoryStore::open(&path),
            Err(StoreError::Persist { .. })
        ));
    }
}
