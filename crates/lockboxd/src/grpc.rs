//! tonic gRPC server over TCP
//!
//! Handlers stay thin: pull the caller identity bound by the auth layer,
//! translate proto messages, delegate to the services, and map
//! `ServiceError` into a `Status`.

use anyhow::Result;
use chrono::TimeDelta;
use lockbox_chunks::{emit, Frame, Ingest, IngestMessage, CHUNK_SIZE};
use lockbox_core::convert::{record_to_item, struct_to_metadata};
use lockbox_core::types::{DataType, NewVaultRecord, UserId};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::metadata::MetadataMap;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{debug, info, warn};

use crate::interceptor::{panic_response, require_user, AuthLayer};
use crate::metrics::Metrics;
use crate::service::{ServiceError, UserService, VaultService};
use crate::session::Authenticator;

use lockbox_core::proto::{
    lockbox_server::{Lockbox, LockboxServer},
    stream_vaults_response::Payload,
    upload_file_request::Data,
    *,
};

/// Frames buffered between the emitting task and the response stream
const STREAM_BUFFER: usize = 4;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Lifetime of tokens issued at register and login
    pub token_ttl: TimeDelta,
    /// Upper bound on uploaded file bytes; `None` is unlimited
    pub upload_limit: Option<usize>,
    /// Deadline for a streamed listing; a shorter `grpc-timeout` wins
    pub stream_timeout: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            token_ttl: TimeDelta::hours(1),
            upload_limit: None,
            stream_timeout: Duration::from_secs(300),
        }
    }
}

pub type ListingStream = Pin<Box<dyn Stream<Item = Result<StreamVaultsResponse, Status>> + Send>>;

/// Implementation of the Lockbox gRPC service
pub struct LockboxImpl {
    users: UserService,
    vaults: VaultService,
    auth: Arc<dyn Authenticator>,
    settings: ServiceSettings,
    metrics: Metrics,
}

impl LockboxImpl {
    pub fn new(
        users: UserService,
        vaults: VaultService,
        auth: Arc<dyn Authenticator>,
        settings: ServiceSettings,
        metrics: Metrics,
    ) -> Self {
        Self {
            users,
            vaults,
            auth,
            settings,
            metrics,
        }
    }

    fn issue_token(&self, user_id: UserId) -> Result<String, Status> {
        self.auth
            .create_token(user_id, self.settings.token_ttl)
            .map_err(|e| Status::from(ServiceError::from(e)))
    }
}

#[tonic::async_trait]
impl Lockbox for LockboxImpl {
    async fn ping(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        self.users.ping().await?;
        Ok(Response::new(Empty {}))
    }

    async fn register_user(
        &self,
        request: Request<RegisterUserRequest>,
    ) -> Result<Response<RegisterUserResponse>, Status> {
        let req = request.into_inner();
        let user = self.users.register(&req.login, &req.password).await?;
        let token = self.issue_token(user.id)?;

        Ok(Response::new(RegisterUserResponse {
            id: user.id,
            login: user.login,
            token,
            success: true,
        }))
    }

    async fn login_user(
        &self,
        request: Request<LoginUserRequest>,
    ) -> Result<Response<LoginUserResponse>, Status> {
        let req = request.into_inner();
        let user = self
            .users
            .login(&req.login, &req.password)
            .await
            .inspect_err(|e| {
                if matches!(e, ServiceError::InvalidCredentials) {
                    self.metrics.auth_failures.inc();
                }
            })?;
        let token = self.issue_token(user.id)?;

        Ok(Response::new(LoginUserResponse {
            id: user.id,
            login: user.login,
            token,
            success: true,
        }))
    }

    async fn change_password(
        &self,
        request: Request<ChangePasswordRequest>,
    ) -> Result<Response<ChangePasswordResponse>, Status> {
        let user_id = require_user(&request)?;
        let req = request.into_inner();
        self.users
            .change_password(user_id, &req.current_password, &req.new_password)
            .await?;
        Ok(Response::new(ChangePasswordResponse { success: true }))
    }

    async fn save_vault(
        &self,
        request: Request<SaveVaultRequest>,
    ) -> Result<Response<SaveVaultResponse>, Status> {
        let user_id = require_user(&request)?;
        let req = request.into_inner();
        let data_type: DataType = req.data_type.parse().map_err(ServiceError::from)?;

        let record = self
            .vaults
            .save(NewVaultRecord {
                user_id,
                name: req.name,
                data_type,
                encrypted_data: req.encrypted_data,
                meta_data: struct_to_metadata(req.meta_data),
            })
            .await?;
        self.metrics.records_saved.inc();

        Ok(Response::new(SaveVaultResponse {
            item: Some(record_to_item(&record.summary())),
        }))
    }

    async fn get_vaults(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<GetUserVaultsResponse>, Status> {
        let user_id = require_user(&request)?;
        let records = self.vaults.list_by_owner(user_id).await?;
        // payloads only travel over the chunked listing
        Ok(Response::new(GetUserVaultsResponse {
            items: records
                .iter()
                .map(|record| record_to_item(&record.summary()))
                .collect(),
        }))
    }

    async fn deactivate_vault(
        &self,
        request: Request<DeactivateVaultRequest>,
    ) -> Result<Response<DeactivateVaultResponse>, Status> {
        let user_id = require_user(&request)?;
        let record_id = request.into_inner().record_id;
        let record = self.vaults.deactivate(user_id, record_id).await?;
        self.metrics.records_deactivated.inc();

        Ok(Response::new(DeactivateVaultResponse {
            success: true,
            version: record.version,
        }))
    }

    async fn upload_file(
        &self,
        request: Request<Streaming<UploadFileRequest>>,
    ) -> Result<Response<VaultItem>, Status> {
        let user_id = require_user(&request)?;
        let mut stream = request.into_inner();
        let mut ingest = Ingest::new(self.settings.upload_limit);

        // a read error returns here and nothing is stored
        while let Some(msg) = stream.message().await? {
            let message = match msg.data {
                Some(Data::MetaData(meta)) => IngestMessage::Metadata((msg.file_name, meta)),
                Some(Data::ChunkData(bytes)) => IngestMessage::Chunk(bytes),
                None => IngestMessage::Chunk(Vec::new()),
            };
            ingest.accept(message).map_err(ServiceError::from)?;
        }
        let ((file_name, meta), blob) = ingest.finish().map_err(ServiceError::from)?;

        let bytes = blob.len();
        let record = self
            .vaults
            .save(NewVaultRecord {
                user_id,
                name: file_name,
                data_type: DataType::Binary,
                encrypted_data: blob,
                meta_data: struct_to_metadata(Some(meta)),
            })
            .await?;
        self.metrics.records_saved.inc();
        self.metrics.upload_bytes.inc_by(bytes as u64);
        info!(user_id, record_id = record.id, bytes, "file upload stored");

        Ok(Response::new(record_to_item(&record.summary())))
    }

    type GetStreamedVaultsStream = ListingStream;

    async fn get_streamed_vaults(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<Self::GetStreamedVaultsStream>, Status> {
        let user_id = require_user(&request)?;
        let timeout = grpc_timeout(request.metadata())
            .map_or(self.settings.stream_timeout, |t| t.min(self.settings.stream_timeout));
        let deadline = Instant::now() + timeout;
        let records = self.vaults.list_by_owner(user_id).await?;

        let items: Vec<(VaultItem, Vec<u8>)> = records
            .into_iter()
            .map(|mut record| {
                let blob = std::mem::take(&mut record.encrypted_data);
                (record_to_item(&record), blob)
            })
            .collect();
        debug!(user_id, items = items.len(), ?timeout, "streaming vault listing");

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            for frame in emit(items, CHUNK_SIZE) {
                if Instant::now() >= deadline {
                    warn!(user_id, "listing deadline expired, stopping emission");
                    break;
                }
                let sent = match &frame {
                    Frame::Chunk(chunk) => chunk.data.len() as u64,
                    Frame::Marker(_) => 0,
                };
                match tokio::time::timeout_at(deadline, tx.send(frame_to_response(frame))).await {
                    Ok(Ok(())) => {
                        metrics.stream_bytes.inc_by(sent);
                    }
                    Ok(Err(_)) => {
                        debug!(user_id, "listing receiver gone, stopping emission");
                        break;
                    }
                    Err(_) => {
                        warn!(user_id, "listing deadline expired, stopping emission");
                        break;
                    }
                }
            }
        });

        Ok(Response::new(until_deadline(rx, deadline)))
    }
}

/// Yield emitted frames until `deadline`, then end with `DeadlineExceeded`.
/// Frames still buffered when the deadline passes are dropped.
fn until_deadline(rx: mpsc::Receiver<StreamVaultsResponse>, deadline: Instant) -> ListingStream {
    Box::pin(futures::stream::unfold(Some(rx), move |state| async move {
        let mut rx = state?;
        let next = tokio::select! {
            biased;
            _ = tokio::time::sleep_until(deadline) => None,
            frame = rx.recv() => Some(frame),
        };
        match next {
            None => Some((
                Err(Status::deadline_exceeded("listing exceeded its deadline")),
                None,
            )),
            Some(frame) => frame.map(|frame| (Ok(frame), Some(rx))),
        }
    }))
}

/// Parse the `grpc-timeout` request header (`<digits><unit>`)
fn grpc_timeout(metadata: &MetadataMap) -> Option<Duration> {
    let value = metadata.get("grpc-timeout")?.to_str().ok()?;
    if value.len() < 2 || value.len() > 9 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    let n: u64 = digits.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(n * 3600)),
        "M" => Some(Duration::from_secs(n * 60)),
        "S" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_millis(n)),
        "u" => Some(Duration::from_micros(n)),
        "n" => Some(Duration::from_nanos(n)),
        _ => None,
    }
}

fn frame_to_response(frame: Frame<VaultItem>) -> StreamVaultsResponse {
    let payload = match frame {
        Frame::Marker(marker) => Payload::Metadata(StreamMetadata {
            total_items: marker.total_items,
            current_item_index: marker.current_item_index,
            is_first_item: marker.is_first_item,
            is_last_item: marker.is_last_item,
        }),
        Frame::Chunk(chunk) => Payload::ItemChunk(VaultItemChunk {
            item: Some(chunk.header),
            encrypted_data_chunk: chunk.data,
            chunk_index: chunk.index,
            total_chunks: chunk.total,
            is_first_chunk: chunk.is_first,
            is_last_chunk: chunk.is_last,
        }),
    };
    StreamVaultsResponse {
        payload: Some(payload),
    }
}

/// Serve on an already-bound listener until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    service: LockboxImpl,
    auth: AuthLayer,
    request_timeout: Duration,
    shutdown: impl Future<Output = ()> + Send,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "gRPC server ready");

    let layers = ServiceBuilder::new()
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(auth)
        .into_inner();

    Server::builder()
        .timeout(request_timeout)
        .layer(layers)
        .add_service(LockboxServer::new(service))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("gRPC server error: {e}"))
}
