//! Sync CLI commands for synchronizing with the server.

use clap::{Args, Subcommand};
use serde::Deserialize;
use std::time::Duration;

use todoosh_core::{SyncError, SyncStatus};

use super::{finish, open_engine};
use crate::config::Config;

/// Sync with remote server
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration and server status
    Status,
}

/// Body of the server's `GET /health`
#[derive(Debug, Deserialize)]
struct Health {
    status: String,
    version: String,
    #[serde(default)]
    read_only: bool,
}

impl SyncCommand {
    pub async fn run(&self, config: &Config) -> Result<(), SyncCommandError> {
        match &self.command {
            None => self.sync(config).await,
            Some(SyncSubcommand::Status) => self.status(config).await,
        }
    }

    async fn sync(&self, config: &Config) -> Result<(), SyncCommandError> {
        if !config.sync.is_configured() {
            return Err(SyncCommandError::NotConfigured);
        }

        println!("Syncing with server...");
        println!();

        let mut engine = open_engine(config, true).await;
        let status = engine.status();
        finish(&mut engine).await;

        match status {
            SyncStatus::Online => {
                println!("  ✓ {} list(s) in sync", engine.lists().len());
                println!();
                println!("Sync complete.");
                Ok(())
            }
            SyncStatus::PermissionDenied => {
                println!("  ✗ server refused writes, changes stay on this device");
                Err(SyncCommandError::Failed(SyncError::PermissionDenied(
                    "write access denied".to_string(),
                )))
            }
            SyncStatus::Offline => Err(SyncCommandError::Failed(SyncError::NotConnected)),
            other => Err(SyncCommandError::Failed(SyncError::Transient(format!(
                "sync ended in state '{}'",
                other
            )))),
        }
    }

    async fn status(&self, config: &Config) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        let Some(server_url) = config.sync.server_url.as_ref() else {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    server_url: \"ws://localhost:8080\"");
            println!("    auto_sync: false");
            println!();
            println!("Or set environment variables:");
            println!("  TODOOSH_SYNC_URL");
            return Ok(());
        };

        println!("Server:    {}", server_url);
        println!(
            "Auto-sync: {}",
            if config.sync.auto_sync {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!(
            "Retries:   {} attempt(s), first retry after {} ms",
            config.sync.max_retries, config.sync.retry_delay_ms
        );
        println!();

        print!("Server status: ");
        match fetch_health(server_url).await {
            Ok(health) if health.read_only => {
                println!("✓ {} (v{}, read-only)", health.status, health.version)
            }
            Ok(health) => println!("✓ {} (v{})", health.status, health.version),
            Err(e) if e.is_connect() || e.is_timeout() => println!("✗ unreachable"),
            Err(e) => println!("✗ error: {}", e),
        }

        Ok(())
    }
}

async fn fetch_health(server_url: &str) -> Result<Health, reqwest::Error> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    client
        .get(health_url(server_url))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
}

/// Maps the sync URL onto the server's HTTP health endpoint.
fn health_url(server_url: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let base = base.strip_suffix("/sync").unwrap_or(base);
    let base = if let Some(rest) = base.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if let Some(rest) = base.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else if base.starts_with("http://") || base.starts_with("https://") {
        base.to_string()
    } else {
        format!("http://{}", base)
    };
    format!("{}/health", base)
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    NotConfigured,
    Failed(SyncError),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::NotConfigured => write!(
                f,
                "Sync not configured. Set sync.server_url in config or TODOOSH_SYNC_URL"
            ),
            SyncCommandError::Failed(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::NotConfigured => None,
            SyncCommandError::Failed(e) => Some(e),
        }
    }
}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::Failed(e)
    }
}
