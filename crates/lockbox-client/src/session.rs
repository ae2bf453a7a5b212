//! Authenticated connection to a lockbox server
//!
//! A session owns the gRPC channel, the bearer token from register/login
//! and the vault password used to encrypt and decrypt record payloads.
//! The password never leaves the client; the server only sees ciphertext.

use lockbox_chunks::{split, ChunkFrame, ItemMarker, StreamAssembler, CHUNK_SIZE};
use lockbox_core::config::ClientConfig;
use lockbox_core::convert::{item_to_record, metadata_to_struct};
use lockbox_core::proto::{
    lockbox_client::LockboxClient, stream_vaults_response::Payload, upload_file_request::Data, *,
};
use lockbox_core::types::{DataType, RecordId, UserId, VaultRecord};
use lockbox_crypto::{decrypt, encrypt, encrypt_file, CryptoError};
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info, warn};

use crate::files::file_metadata;
use crate::payload::SecretPayload;
use crate::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    /// Deadline for unary calls
    pub call: Duration,
    /// Deadline for uploads and streamed listings, end to end
    pub stream: Duration,
}

impl Timeouts {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            connect: Duration::from_secs(config.connect_timeout_secs),
            call: Duration::from_secs(config.call_timeout_secs),
            stream: Duration::from_secs(config.stream_timeout_secs),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

/// A record from a listing, with its payload decrypted where possible
#[derive(Debug)]
pub struct FetchedRecord {
    /// Still carries the ciphertext in `encrypted_data`
    pub record: VaultRecord,
    pub plaintext: Result<Vec<u8>, CryptoError>,
}

impl FetchedRecord {
    /// Structured secret for non-binary records that decrypted cleanly
    pub fn secret(&self) -> Option<Result<SecretPayload, ClientError>> {
        if self.record.data_type == DataType::Binary {
            return None;
        }
        let bytes = self.plaintext.as_ref().ok()?;
        Some(SecretPayload::from_json(self.record.data_type, bytes))
    }
}

pub struct LockboxSession {
    client: LockboxClient<Channel>,
    token: Option<String>,
    password: Option<Arc<SecretString>>,
    timeouts: Timeouts,
}

impl LockboxSession {
    pub async fn connect(addr: &str, timeouts: Timeouts) -> Result<Self, ClientError> {
        let channel = Endpoint::from_shared(addr.to_string())?
            .connect_timeout(timeouts.connect)
            .connect()
            .await?;
        debug!(addr, "connected");
        Ok(Self {
            client: LockboxClient::new(channel),
            token: None,
            password: None,
            timeouts,
        })
    }

    /// Resume a session from a token issued earlier.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_vault_password(mut self, password: SecretString) -> Self {
        self.password = Some(Arc::new(password));
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub async fn ping(&mut self) -> Result<(), ClientError> {
        let req = self.request(Empty {}, self.timeouts.call)?;
        let client = &mut self.client;
        with_deadline(self.timeouts.call, async move {
            client.ping(req).await?;
            Ok::<_, ClientError>(())
        })
        .await
    }

    pub async fn register(
        &mut self,
        login: &str,
        password: SecretString,
    ) -> Result<UserId, ClientError> {
        let req = self.request(
            RegisterUserRequest {
                login: login.to_string(),
                password: password.expose_secret().to_string(),
            },
            self.timeouts.call,
        )?;
        let client = &mut self.client;
        let resp = with_deadline(self.timeouts.call, async move {
            Ok::<_, ClientError>(client.register_user(req).await?.into_inner())
        })
        .await?;

        info!(user_id = resp.id, "registered");
        self.token = Some(resp.token);
        self.password = Some(Arc::new(password));
        Ok(resp.id)
    }

    pub async fn login(&mut self, login: &str, password: SecretString) -> Result<UserId, ClientError> {
        let req = self.request(
            LoginUserRequest {
                login: login.to_string(),
                password: password.expose_secret().to_string(),
            },
            self.timeouts.call,
        )?;
        let client = &mut self.client;
        let resp = with_deadline(self.timeouts.call, async move {
            Ok::<_, ClientError>(client.login_user(req).await?.into_inner())
        })
        .await?;

        info!(user_id = resp.id, "logged in");
        self.token = Some(resp.token);
        self.password = Some(Arc::new(password));
        Ok(resp.id)
    }

    /// Changes the account password only. Existing records stay encrypted
    /// under the vault password they were saved with.
    pub async fn change_password(
        &mut self,
        current: &SecretString,
        new: &SecretString,
    ) -> Result<(), ClientError> {
        let req = self.authed(
            ChangePasswordRequest {
                current_password: current.expose_secret().to_string(),
                new_password: new.expose_secret().to_string(),
            },
            self.timeouts.call,
        )?;
        let client = &mut self.client;
        with_deadline(self.timeouts.call, async move {
            client.change_password(req).await?;
            Ok::<_, ClientError>(())
        })
        .await
    }

    /// Encrypt `payload` under the vault password and store it as `name`.
    pub async fn save_secret(
        &mut self,
        name: &str,
        payload: &SecretPayload,
    ) -> Result<VaultRecord, ClientError> {
        let password = self.vault_password()?;
        let json = payload.to_json()?;
        let encrypted_data = tokio::task::spawn_blocking(move || encrypt(&json, &password)).await??;

        let req = self.authed(
            SaveVaultRequest {
                name: name.to_string(),
                data_type: payload.data_type().to_string(),
                encrypted_data,
                meta_data: None,
            },
            self.timeouts.call,
        )?;
        let client = &mut self.client;
        let item = with_deadline(self.timeouts.call, async move {
            let resp: SaveVaultResponse = client.save_vault(req).await?.into_inner();
            resp.item
                .ok_or_else(|| ClientError::Protocol("save reply without item".into()))
        })
        .await?;
        Ok(item_to_record(item)?)
    }

    /// Encrypt the file at `path` and upload it as a binary record `name`.
    pub async fn upload_file(&mut self, path: &Path, name: &str) -> Result<VaultRecord, ClientError> {
        let password = self.vault_password()?;
        let owned = path.to_path_buf();
        let (meta, blob) = tokio::task::spawn_blocking(move || {
            let meta = file_metadata(&owned)?;
            let blob = encrypt_file(&owned, &password)?;
            Ok::<_, ClientError>((meta, blob))
        })
        .await??;

        let chunks = split(&blob, CHUNK_SIZE);
        let mut messages = Vec::with_capacity(chunks.len() + 1);
        messages.push(UploadFileRequest {
            file_name: name.to_string(),
            data: Some(Data::MetaData(metadata_to_struct(&meta))),
        });
        messages.extend(chunks.map(|chunk| UploadFileRequest {
            file_name: name.to_string(),
            data: Some(Data::ChunkData(chunk.data.to_vec())),
        }));
        debug!(name, bytes = blob.len(), messages = messages.len(), "uploading");

        let req = self.authed(tokio_stream::iter(messages), self.timeouts.stream)?;
        let client = &mut self.client;
        let item = with_deadline(self.timeouts.stream, async move {
            Ok::<_, ClientError>(client.upload_file(req).await?.into_inner())
        })
        .await?;
        Ok(item_to_record(item)?)
    }

    /// Stream every active record, newest first, and decrypt each payload.
    ///
    /// A record that fails to decrypt is returned with the error in
    /// `plaintext`; it does not fail the listing.
    pub async fn fetch_records(&mut self) -> Result<Vec<FetchedRecord>, ClientError> {
        let password = self.vault_password()?;
        let items = self.stream_listing().await?;
        tokio::task::spawn_blocking(move || {
            items
                .into_iter()
                .map(|(item, blob)| open_record(item, blob, &password))
                .collect::<Result<Vec<_>, ClientError>>()
        })
        .await?
    }

    /// Stream the listing but decrypt only the record with `record_id`.
    pub async fn fetch_record(
        &mut self,
        record_id: RecordId,
    ) -> Result<Option<FetchedRecord>, ClientError> {
        let password = self.vault_password()?;
        let items = self.stream_listing().await?;
        let Some((item, blob)) = items.into_iter().find(|(item, _)| item.id == record_id) else {
            return Ok(None);
        };
        tokio::task::spawn_blocking(move || open_record(item, blob, &password).map(Some)).await?
    }

    /// `GetStreamedVaults` reassembled into (header, ciphertext) pairs
    async fn stream_listing(&mut self) -> Result<Vec<(VaultItem, Vec<u8>)>, ClientError> {
        let req = self.authed(Empty {}, self.timeouts.stream)?;
        let client = &mut self.client;

        with_deadline(self.timeouts.stream, async move {
            let mut stream = client.get_streamed_vaults(req).await?.into_inner();
            let mut assembler = StreamAssembler::new();
            while let Some(resp) = stream.message().await? {
                match resp.payload {
                    Some(Payload::Metadata(m)) => assembler.on_marker(ItemMarker {
                        total_items: m.total_items,
                        current_item_index: m.current_item_index,
                        is_first_item: m.is_first_item,
                        is_last_item: m.is_last_item,
                    }),
                    Some(Payload::ItemChunk(c)) => {
                        let header = c.item.ok_or_else(|| {
                            ClientError::Protocol("chunk without item header".into())
                        })?;
                        assembler.on_chunk(ChunkFrame {
                            header,
                            data: c.encrypted_data_chunk,
                            index: c.chunk_index,
                            total: c.total_chunks,
                            is_first: c.is_first_chunk,
                            is_last: c.is_last_chunk,
                        });
                    }
                    None => return Err(ClientError::Protocol("empty listing frame".into())),
                }
            }
            Ok::<_, ClientError>(assembler.finish())
        })
        .await
    }

    /// Active record summaries in one unary call, without decryption
    pub async fn list_records(&mut self) -> Result<Vec<VaultRecord>, ClientError> {
        let req = self.authed(Empty {}, self.timeouts.call)?;
        let client = &mut self.client;
        let items = with_deadline(self.timeouts.call, async move {
            Ok::<_, ClientError>(client.get_vaults(req).await?.into_inner().items)
        })
        .await?;
        items
            .into_iter()
            .map(|item| item_to_record(item).map_err(ClientError::from))
            .collect()
    }

    /// Returns the record's new version.
    pub async fn deactivate(&mut self, record_id: RecordId) -> Result<i64, ClientError> {
        let req = self.authed(DeactivateVaultRequest { record_id }, self.timeouts.call)?;
        let client = &mut self.client;
        let resp = with_deadline(self.timeouts.call, async move {
            Ok::<_, ClientError>(client.deactivate_vault(req).await?.into_inner())
        })
        .await?;
        Ok(resp.version)
    }

    fn vault_password(&self) -> Result<Arc<SecretString>, ClientError> {
        self.password
            .clone()
            .ok_or(ClientError::NotAuthenticated("vault password not set"))
    }

    fn request<T>(&self, message: T, timeout: Duration) -> Result<tonic::Request<T>, ClientError> {
        let mut req = tonic::Request::new(message);
        req.set_timeout(timeout);
        if let Some(token) = &self.token {
            let value: MetadataValue<Ascii> = format!("Bearer {token}")
                .parse()
                .map_err(|_| ClientError::Protocol("token is not a valid header value".into()))?;
            req.metadata_mut().insert("authorization", value);
        }
        Ok(req)
    }

    fn authed<T>(&self, message: T, timeout: Duration) -> Result<tonic::Request<T>, ClientError> {
        if self.token.is_none() {
            return Err(ClientError::NotAuthenticated("log in or pass a token first"));
        }
        self.request(message, timeout)
    }
}

fn open_record(
    item: VaultItem,
    blob: Vec<u8>,
    password: &SecretString,
) -> Result<FetchedRecord, ClientError> {
    let mut record = item_to_record(item)?;
    let plaintext = decrypt(&blob, password);
    if let Err(e) = &plaintext {
        warn!(record_id = record.id, "record did not decrypt: {e}");
    }
    record.encrypted_data = blob;
    Ok(FetchedRecord { record, plaintext })
}

/// Run `fut` under a local deadline; expiry drops any partial state.
async fn with_deadline<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, ClientError>>,
) -> Result<T, ClientError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ClientError::Cancelled)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_expiry_is_cancelled() {
        let res: Result<(), ClientError> = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(res, Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let res = with_deadline(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(res.unwrap(), 7);
    }

    #[test]
    fn test_timeouts_from_config() {
        let t = Timeouts::from_config(&ClientConfig {
            call_timeout_secs: 3,
            ..Default::default()
        });
        assert_eq!(t.call, Duration::from_secs(3));
        assert_eq!(Timeouts::default().stream, Duration::from_secs(120));
    }

    #[test]
    fn test_open_record_decrypts_or_reports() {
        let password = SecretString::from("pw");
        let blob = encrypt(b"{\"title\":\"t\",\"content\":\"c\"}", &password).unwrap();
        let item = VaultItem {
            id: 4,
            name: "n".into(),
            data_type: "text".into(),
            version: 1,
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
            active: true,
            ..Default::default()
        };

        let opened = open_record(item.clone(), blob.clone(), &password).unwrap();
        assert_eq!(opened.record.encrypted_data, blob);
        assert!(matches!(opened.secret(), Some(Ok(SecretPayload::Text(_)))));

        let wrong = open_record(item, blob, &SecretString::from("other")).unwrap();
        assert!(wrong.plaintext.is_err());
    }

    #[test]
    fn test_binary_record_has_no_secret() {
        let record = VaultRecord {
            id: 1,
            user_id: 1,
            name: "f".into(),
            data_type: DataType::Binary,
            encrypted_data: Vec::new(),
            meta_data: Default::default(),
            version: 1,
            created_at: Default::default(),
            updated_at: Default::default(),
            active: true,
        };
        let fetched = FetchedRecord {
            record,
            plaintext: Ok(b"raw".to_vec()),
        };
        assert!(fetched.secret().is_none());
    }
}
