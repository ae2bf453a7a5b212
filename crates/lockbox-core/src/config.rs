use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from lockbox.toml)
///
/// The same file serves the daemon (`[server]`, `[auth]`, `[password]`,
/// `[storage]`, `[transfer]`) and the CLI (`[client]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockboxConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub password: PasswordConfig,
    pub storage: StorageConfig,
    pub transfer: TransferConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// gRPC listen address (default: 127.0.0.1:8099)
    pub listen: String,
    /// Per-call deadline enforced by the server
    pub request_timeout_secs: u64,
    /// Prometheus metrics endpoint (disabled when absent)
    pub metrics_addr: Option<String>,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for session tokens, at least 32 bytes.
    /// Usually supplied through LOCKBOX_JWT_SECRET rather than the file.
    pub jwt_secret: Option<String>,
    /// Session token lifetime (default: 3600)
    pub token_ttl_secs: u64,
}

/// Argon2id parameters for login password hashes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    pub argon2_mem_cost_kib: u32,
    pub argon2_time_cost: u32,
    pub argon2_parallelism: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON snapshot file; the store is purely in-memory when unset
    pub snapshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Upper bound on a single file upload, in MiB (0 = unlimited)
    pub max_upload_mib: u64,
    /// Deadline for a streamed listing, from the call until the last frame
    pub stream_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server endpoint URI
    pub server_addr: String,
    pub connect_timeout_secs: u64,
    /// Deadline for unary calls
    pub call_timeout_secs: u64,
    /// Deadline for uploads and streamed listings
    pub stream_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8099".into(),
            request_timeout_secs: 30,
            metrics_addr: None,
            log_level: "info".into(),
            log_format: "json".into(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_secs: 3600,
        }
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            argon2_mem_cost_kib: 19456,
            argon2_time_cost: 2,
            argon2_parallelism: 1,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_upload_mib: 256,
            stream_timeout_secs: 300,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "http://127.0.0.1:8099".into(),
            connect_timeout_secs: 5,
            call_timeout_secs: 15,
            stream_timeout_secs: 120,
        }
    }
}

impl TransferConfig {
    /// Upload limit in bytes, `None` when unlimited
    pub fn max_upload_bytes(&self) -> Option<usize> {
        if self.max_upload_mib == 0 {
            None
        } else {
            usize::try_from(self.max_upload_mib.saturating_mul(1024 * 1024)).ok()
        }
    }
}
