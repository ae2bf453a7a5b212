//! lockbox: Lockbox vault CLI
//!
//! Account commands:
//!   ping                      - check the server is reachable
//!   register <login>          - create an account, print a session token
//!   login <login>             - print a fresh session token
//!   change-password           - change the account password
//!
//! Vault commands (need LOCKBOX_TOKEN or --token):
//!   save credential|card|text - encrypt and store a structured secret
//!   upload <path>             - encrypt and store a file
//!   list [--reveal]           - list records, optionally decrypted
//!   download <id> <dest>      - decrypt a stored file to <dest>
//!   deactivate <id>           - remove a record from listings

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lockbox_client::{
    format_file_size, Card, Credential, FetchedRecord, LockboxSession, Note, SecretPayload,
    Timeouts,
};
use lockbox_core::config::LockboxConfig;
use lockbox_core::types::{DataType, RecordId, VaultRecord};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "lockbox",
    version,
    about = "Lockbox vault client",
    long_about = "lockbox: keep credentials, cards, notes and files in a lockbox vault, \
                  encrypted locally before they reach the server"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short = 'c', env = "LOCKBOX_CONFIG", default_value = "/etc/lockbox/config.toml")]
    config: PathBuf,

    /// Server address; overrides client.server_addr
    #[arg(long, env = "LOCKBOX_SERVER")]
    server: Option<String>,

    /// Session token printed by `register` or `login`
    #[arg(long, env = "LOCKBOX_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Vault password; prompted for when absent
    #[arg(long, env = "LOCKBOX_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the server and its storage answer
    Ping,

    /// Create an account and print its session token
    Register { login: String },

    /// Log in and print a session token
    Login { login: String },

    /// Encrypt and store a structured secret
    Save {
        #[command(subcommand)]
        kind: SaveKind,
    },

    /// Encrypt and store a file
    Upload {
        path: PathBuf,
        /// Record name (default: the file name)
        #[arg(long)]
        name: Option<String>,
    },

    /// List active records, newest first
    List {
        /// Decrypt and print payloads
        #[arg(long)]
        reveal: bool,
    },

    /// Decrypt a stored file and write it to <dest>
    Download { id: RecordId, dest: PathBuf },

    /// Remove a record from listings
    Deactivate { id: RecordId },

    /// Change the account password
    #[command(name = "change-password")]
    ChangePassword,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum SaveKind {
    /// Login credentials for a service
    Credential {
        name: String,
        #[arg(long)]
        service: String,
        #[arg(long)]
        username: String,
        /// Credential password; prompted for when absent
        #[arg(long)]
        secret: Option<String>,
        #[arg(long, default_value = "")]
        url: String,
    },

    /// Payment card
    Card {
        name: String,
        #[arg(long)]
        card_name: String,
        #[arg(long)]
        number: String,
        /// MM/YY
        #[arg(long)]
        expiry: String,
        #[arg(long)]
        cvv: String,
        #[arg(long, default_value = "")]
        holder: String,
    },

    /// Free-form note
    Text {
        name: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();
    let config = load_config(&cli.config).await?;

    match &cli.command {
        Commands::Ping => cmd_ping(&cli, &config).await,
        Commands::Register { login } => cmd_register(&cli, &config, login).await,
        Commands::Login { login } => cmd_login(&cli, &config, login).await,
        Commands::Save { kind } => cmd_save(&cli, &config, kind).await,
        Commands::Upload { path, name } => cmd_upload(&cli, &config, path, name.as_deref()).await,
        Commands::List { reveal } => cmd_list(&cli, &config, *reveal).await,
        Commands::Download { id, dest } => cmd_download(&cli, &config, *id, dest).await,
        Commands::Deactivate { id } => cmd_deactivate(&cli, &config, *id).await,
        Commands::ChangePassword => cmd_change_password(&cli, &config).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_env("LOCKBOX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<LockboxConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(LockboxConfig::default())
    }
}

// ── Session helpers ───────────────────────────────────────────────────────────

async fn connect(cli: &Cli, config: &LockboxConfig) -> Result<LockboxSession> {
    let addr = cli
        .server
        .clone()
        .unwrap_or_else(|| config.client.server_addr.clone());
    tracing::debug!(addr = %addr, "connecting");
    LockboxSession::connect(&addr, Timeouts::from_config(&config.client))
        .await
        .with_context(|| format!("connecting to lockbox server at {addr}"))
}

/// Session carrying the token and, when `with_password`, the vault password
async fn open_session(cli: &Cli, config: &LockboxConfig, with_password: bool) -> Result<LockboxSession> {
    let token = cli.token.clone().context(
        "no session token\n\
         Log in first and export the printed token:\n\
         \texport LOCKBOX_TOKEN=$(lockbox login <login>)",
    )?;
    let session = connect(cli, config).await?.with_token(token);
    if with_password {
        Ok(session.with_vault_password(vault_password(cli, "Vault password: ")?))
    } else {
        Ok(session)
    }
}

fn vault_password(cli: &Cli, prompt: &str) -> Result<SecretString> {
    match &cli.password {
        Some(p) => Ok(SecretString::from(p.clone())),
        None => prompt_secret(prompt),
    }
}

fn prompt_secret(prompt: &str) -> Result<SecretString> {
    let value = rpassword::prompt_password(prompt).context("reading password")?;
    Ok(SecretString::from(value))
}

fn prompt_new_secret(prompt: &str) -> Result<SecretString> {
    let first = prompt_secret(prompt)?;
    let second = prompt_secret("Repeat: ")?;
    if first.expose_secret() != second.expose_secret() {
        anyhow::bail!("passwords do not match");
    }
    Ok(first)
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `lockbox ping` ────────────────────────────────────────────────────────────

async fn cmd_ping(cli: &Cli, config: &LockboxConfig) -> Result<()> {
    let mut session = connect(cli, config).await?;
    session.ping().await.context("ping failed")?;
    println!("ok");
    Ok(())
}

// ── `lockbox register` / `lockbox login` ──────────────────────────────────────

async fn cmd_register(cli: &Cli, config: &LockboxConfig, login: &str) -> Result<()> {
    let password = match &cli.password {
        Some(p) => SecretString::from(p.clone()),
        None => prompt_new_secret("Password: ")?,
    };
    let mut session = connect(cli, config).await?;
    let id = session
        .register(login, password)
        .await
        .context("registration failed")?;

    eprintln!("registered {login} (id {id})");
    println!("{}", session.token().unwrap_or_default());
    Ok(())
}

async fn cmd_login(cli: &Cli, config: &LockboxConfig, login: &str) -> Result<()> {
    let password = vault_password(cli, "Password: ")?;
    let mut session = connect(cli, config).await?;
    session.login(login, password).await.context("login failed")?;
    println!("{}", session.token().unwrap_or_default());
    Ok(())
}

// ── `lockbox change-password` ─────────────────────────────────────────────────

async fn cmd_change_password(cli: &Cli, config: &LockboxConfig) -> Result<()> {
    let current = vault_password(cli, "Current password: ")?;
    let new = prompt_new_secret("New password: ")?;
    let mut session = open_session(cli, config, false).await?;
    session
        .change_password(&current, &new)
        .await
        .context("password change failed")?;
    println!("Password changed.");
    println!("  Records saved earlier still decrypt with the old password.");
    Ok(())
}

// ── `lockbox save` ────────────────────────────────────────────────────────────

async fn cmd_save(cli: &Cli, config: &LockboxConfig, kind: &SaveKind) -> Result<()> {
    let (name, payload) = match kind {
        SaveKind::Credential {
            name,
            service,
            username,
            secret,
            url,
        } => {
            let password = match secret {
                Some(s) => s.clone(),
                None => prompt_secret("Credential password: ")?.expose_secret().to_string(),
            };
            let payload = SecretPayload::Credential(Credential {
                service: service.clone(),
                username: username.clone(),
                password,
                url: url.clone(),
            });
            (name, payload)
        }
        SaveKind::Card {
            name,
            card_name,
            number,
            expiry,
            cvv,
            holder,
        } => {
            let payload = SecretPayload::Card(Card {
                card_name: card_name.clone(),
                card_number: number.clone(),
                expiry: expiry.clone(),
                cvv: cvv.clone(),
                cardholder: holder.clone(),
            });
            (name, payload)
        }
        SaveKind::Text {
            name,
            title,
            content,
        } => {
            let payload = SecretPayload::Text(Note {
                title: title.clone(),
                content: content.clone(),
            });
            (name, payload)
        }
    };

    let mut session = open_session(cli, config, true).await?;
    let record = session
        .save_secret(name, &payload)
        .await
        .with_context(|| format!("saving {name}"))?;
    println!("Saved {} record {} (id {})", record.data_type, record.name, record.id);
    Ok(())
}

// ── `lockbox upload` ──────────────────────────────────────────────────────────

async fn cmd_upload(cli: &Cli, config: &LockboxConfig, path: &Path, name: Option<&str>) -> Result<()> {
    let name = match name {
        Some(n) => n.to_string(),
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("no file name in {}", path.display()))?,
    };
    let mut session = open_session(cli, config, true).await?;

    let pb = make_spinner("upload");
    pb.set_message(format!("{}", path.display()));
    let record = session
        .upload_file(path, &name)
        .await
        .with_context(|| format!("uploading {}", path.display()));
    pb.finish_and_clear();
    let record = record?;

    println!("Uploaded {} → record {}", path.display(), record.id);
    if let Some(size) = file_size(&record) {
        println!("  size:    {}", format_file_size(size));
    }
    println!("  version: {}", record.version);
    Ok(())
}

// ── `lockbox list` ────────────────────────────────────────────────────────────

async fn cmd_list(cli: &Cli, config: &LockboxConfig, reveal: bool) -> Result<()> {
    let mut session = open_session(cli, config, reveal).await?;

    if !reveal {
        let records = session.list_records().await.context("listing records")?;
        if records.is_empty() {
            println!("No records.");
        }
        for record in &records {
            print_summary(record);
        }
        return Ok(());
    }

    let pb = make_spinner("list");
    pb.set_message("fetching records...");
    let fetched = session.fetch_records().await.context("fetching records");
    pb.finish_and_clear();
    let fetched = fetched?;

    if fetched.is_empty() {
        println!("No records.");
    }
    for item in &fetched {
        print_summary(&item.record);
        print_revealed(item);
    }
    Ok(())
}

fn print_summary(record: &VaultRecord) {
    let detail = match record.data_type {
        DataType::Binary => file_size(record).map(format_file_size).unwrap_or_default(),
        _ => String::new(),
    };
    println!(
        "{:>6}  {:<11} {:<32} {}  v{} {}",
        record.id,
        record.data_type,
        record.name,
        record.created_at.format("%Y-%m-%d %H:%M"),
        record.version,
        detail,
    );
}

/// Plaintext size recorded at upload; metadata numbers arrive as doubles
fn file_size(record: &VaultRecord) -> Option<u64> {
    record
        .meta_data
        .get("file_size")
        .and_then(|v| v.as_f64())
        .map(|n| n as u64)
}

fn print_revealed(item: &FetchedRecord) {
    match &item.plaintext {
        Err(e) => println!("        ! cannot decrypt: {e}"),
        Ok(bytes) if item.record.data_type == DataType::Binary => {
            println!("        {} of file data", format_file_size(bytes.len() as u64));
        }
        Ok(_) => match item.secret() {
            Some(Ok(secret)) => {
                let rendered = serde_json::to_string_pretty(&secret)
                    .unwrap_or_else(|e| format!("<unprintable: {e}>"));
                for line in rendered.lines() {
                    println!("        {line}");
                }
            }
            Some(Err(e)) => println!("        ! malformed payload: {e}"),
            None => {}
        },
    }
}

// ── `lockbox download` ────────────────────────────────────────────────────────

async fn cmd_download(cli: &Cli, config: &LockboxConfig, id: RecordId, dest: &Path) -> Result<()> {
    let mut session = open_session(cli, config, true).await?;

    let pb = make_spinner("download");
    pb.set_message(format!("record {id}"));
    let fetched = session.fetch_record(id).await.context("fetching records");
    pb.finish_and_clear();

    let item = fetched?.with_context(|| format!("no active record with id {id}"))?;
    if item.record.data_type != DataType::Binary {
        anyhow::bail!(
            "record {id} is a {} record; use `lockbox list --reveal`",
            item.record.data_type
        );
    }
    let bytes = item
        .plaintext
        .with_context(|| format!("decrypting record {id}"))?;

    tokio::fs::write(dest, &bytes)
        .await
        .with_context(|| format!("writing {}", dest.display()))?;
    println!(
        "Downloaded {} → {} ({})",
        item.record.name,
        dest.display(),
        format_file_size(bytes.len() as u64)
    );
    Ok(())
}

// ── `lockbox deactivate` ──────────────────────────────────────────────────────

async fn cmd_deactivate(cli: &Cli, config: &LockboxConfig, id: RecordId) -> Result<()> {
    let mut session = open_session(cli, config, false).await?;
    let version = session
        .deactivate(id)
        .await
        .with_context(|| format!("deactivating record {id}"))?;
    println!("Deactivated record {id} (version {version})");
    Ok(())
}

// ── `lockbox config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &LockboxConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();

    let mut shown = config.clone();
    if shown.auth.jwt_secret.is_some() {
        shown.auth.jwt_secret = Some("[REDACTED]".into());
    }
    let rendered = toml::to_string_pretty(&shown).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
