//! Daemon lifecycle: startup, metrics endpoint, gRPC server, shutdown

use anyhow::{Context, Result};
use chrono::TimeDelta;
use lockbox_core::config::LockboxConfig;
use lockbox_crypto::Argon2Digest;
use lockbox_storage::{MemoryStore, UserRepository, VaultRepository};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::grpc::{LockboxImpl, ServiceSettings};
use crate::interceptor::AuthLayer;
use crate::metrics::{HealthState, Metrics};
use crate::service::{UserService, VaultService};
use crate::session::{Authenticator, JwtAuthenticator};

pub async fn run(config: LockboxConfig) -> Result<()> {
    info!("daemon starting");

    // ── Session signing ──────────────────────────────────────────────────
    let secret = config
        .auth
        .jwt_secret
        .as_deref()
        .context("auth.jwt_secret is not set (config file, --jwt-secret or LOCKBOX_JWT_SECRET)")?;
    let auth: Arc<dyn Authenticator> = Arc::new(JwtAuthenticator::new(secret.as_bytes())?);

    let settings = ServiceSettings {
        token_ttl: token_ttl(config.auth.token_ttl_secs)?,
        upload_limit: config.transfer.max_upload_bytes(),
        stream_timeout: Duration::from_secs(config.transfer.stream_timeout_secs),
    };

    // ── Storage ──────────────────────────────────────────────────────────
    let store = match &config.storage.snapshot_path {
        Some(path) => Arc::new(
            MemoryStore::open(path)
                .with_context(|| format!("opening snapshot {}", path.display()))?,
        ),
        None => {
            warn!("storage.snapshot_path not set: vault contents are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    let users: Arc<dyn UserRepository> = store.clone();
    let vaults: Arc<dyn VaultRepository> = store;

    let digest = Argon2Digest::new(
        config.password.argon2_mem_cost_kib,
        config.password.argon2_time_cost,
        config.password.argon2_parallelism,
    )?;

    // ── Metrics ──────────────────────────────────────────────────────────
    let mut registry = Registry::default();
    let metrics = Metrics::register(&mut registry);
    if let Some(addr) = config.server.metrics_addr.clone() {
        let state = HealthState {
            registry: Arc::new(registry),
            store: users.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = crate::metrics::serve(addr, state).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    // ── gRPC ─────────────────────────────────────────────────────────────
    let service = LockboxImpl::new(
        UserService::new(users, Arc::new(digest)),
        VaultService::new(vaults),
        auth.clone(),
        settings,
        metrics.clone(),
    );
    let layer = AuthLayer::new(auth, metrics);

    let listener = TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    info!(
        listen = %config.server.listen,
        upload_limit = ?config.transfer.max_upload_bytes(),
        "gRPC: listening"
    );

    notify_ready();

    crate::grpc::serve(
        listener,
        service,
        layer,
        Duration::from_secs(config.server.request_timeout_secs),
        shutdown_signal(),
    )
    .await?;

    info!("daemon stopped");
    Ok(())
}

fn token_ttl(secs: u64) -> Result<TimeDelta> {
    let ttl = i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .filter(|ttl| *ttl > TimeDelta::zero())
        .with_context(|| format!("auth.token_ttl_secs out of range: {secs}"))?;
    Ok(ttl)
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("ctrl-c handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining calls");
}

fn notify_ready() {
    // sd_notify(READY=1) when run under systemd; no-op without $NOTIFY_SOCKET
    #[cfg(unix)]
    if let Ok(socket) = std::env::var("NOTIFY_SOCKET") {
        use std::os::unix::net::UnixDatagram;
        if let Ok(sock) = UnixDatagram::unbound() {
            let _ = sock.send_to(b"READY=1\n", &socket);
            tracing::debug!(notify_socket = %socket, "sent systemd READY=1");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_ttl_bounds() {
        assert_eq!(token_ttl(3600).unwrap(), TimeDelta::hours(1));
        assert!(token_ttl(0).is_err());
        assert!(token_ttl(u64::MAX).is_err());
    }

    #[tokio::test]
    async fn test_run_requires_jwt_secret() {
        let err = run(LockboxConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("jwt_secret"), "{err}");
    }

    #[tokio::test]
    async fn test_run_rejects_short_secret() {
        let mut config = LockboxConfig::default();
        config.auth.jwt_secret = Some("short".into());
        assert!(run(config).await.is_err());
    }
}
