//! Shared harness: a lockboxd instance on an ephemeral port, backed by a
//! volatile store and cheap Argon2 parameters.

use lockbox_crypto::Argon2Digest;
use lockbox_storage::MemoryStore;
use lockboxd::metrics::Metrics;
use lockboxd::service::{UserService, VaultService};
use lockboxd::{AuthLayer, JwtAuthenticator, LockboxImpl, ServiceSettings};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const SECRET: &[u8] = b"integration-test-secret-32-bytes";

pub struct TestServer {
    pub addr: String,
    pub auth: Arc<JwtAuthenticator>,
    pub metrics: Metrics,
    _shutdown: oneshot::Sender<()>,
}

#[allow(dead_code)]
pub async fn spawn_server(upload_limit: Option<usize>) -> TestServer {
    spawn_server_with(ServiceSettings {
        upload_limit,
        ..Default::default()
    })
    .await
}

#[allow(dead_code)]
pub async fn spawn_server_with(settings: ServiceSettings) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let store = Arc::new(MemoryStore::new());
    let digest = Arc::new(Argon2Digest::new(1024, 1, 1).unwrap());
    let auth = Arc::new(JwtAuthenticator::new(SECRET).unwrap());
    let metrics = Metrics::default();

    let service = LockboxImpl::new(
        UserService::new(store.clone(), digest),
        VaultService::new(store),
        auth.clone(),
        settings,
        metrics.clone(),
    );
    let layer = AuthLayer::new(auth.clone(), metrics.clone());

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(lockboxd::grpc::serve(
        listener,
        service,
        layer,
        Duration::from_secs(30),
        async {
            let _ = rx.await;
        },
    ));

    TestServer {
        addr: format!("http://{addr}"),
        auth,
        metrics,
        _shutdown: tx,
    }
}
