//! Todoosh Sync Server
//!
//! Holds the shared list document and relays every change to the other
//! connected devices.
//!
//! # Configuration
//!
//! Environment variables:
//! - `TODOOSH_PORT`: Port to listen on (default: 8080)
//! - `TODOOSH_DATA_DIR`: Directory to store the document (default: ~/.local/share/todoosh-server)
//! - `TODOOSH_READ_ONLY`: Reject every write with permission-denied (default: false)
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint
//! - `GET /sync`: WebSocket endpoint speaking the CBOR sync protocol

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod hub;
mod storage;

use hub::SyncHub;
use storage::DocumentStore;

// ============================================================================
// Configuration
// ============================================================================

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    /// Port to listen on
    port: u16,
    /// Directory to store the document
    data_dir: PathBuf,
    /// Reject writes
    read_only: bool,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("TODOOSH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = std::env::var("TODOOSH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("todoosh-server")
            });

        let read_only = std::env::var("TODOOSH_READ_ONLY")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        Self {
            port,
            data_dir,
            read_only,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Clone)]
struct AppState {
    hub: Arc<SyncHub>,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    read_only: bool,
    lists: usize,
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        read_only: state.hub.is_read_only(),
        lists: state.hub.document().await.len(),
    })
}

/// Upgrades to a sync session
async fn sync_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| hub::serve(socket, state.hub))
}

fn app(hub: Arc<SyncHub>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sync", get(sync_socket))
        .with_state(AppState { hub })
        .layer(TraceLayer::new_for_http())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todoosh_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    let store = match DocumentStore::open(&config.data_dir) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open document store: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Document: {}", store.path().display());
    if config.read_only {
        tracing::info!("Read-only mode: writes will be rejected");
    }

    let hub = Arc::new(SyncHub::new(store, config.read_only));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app(hub)).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use todoosh_core::{
        Command, MemoryStore, SyncEngine, SyncError, SyncOptions, SyncStatus, WsRemote,
    };

    async fn start(read_only: bool) -> (String, Arc<SyncHub>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = DocumentStore::open(temp_dir.path()).unwrap();
        let hub = Arc::new(SyncHub::new(store, read_only));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app(hub.clone());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        (format!("ws://{}", addr), hub, temp_dir)
    }

    async fn client(url: &str) -> SyncEngine {
        let remote = WsRemote::connect(url);
        assert!(remote.wait_connected(Duration::from_secs(5)).await);
        let options = SyncOptions {
            retry_delay: Duration::from_millis(10),
            ..SyncOptions::default()
        };
        SyncEngine::new(MemoryStore::new(), options).with_remote(Arc::new(remote))
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" 1 "));
        assert!(parse_flag("YES"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }

    #[tokio::test]
    async fn test_health() {
        let (url, _hub, _temp) = start(true).await;
        let health_url = format!("{}/health", url.replacen("ws://", "http://", 1));

        let body: serde_json::Value = reqwest::get(&health_url)
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["read_only"], true);
        assert_eq!(body["lists"], 0);
    }

    #[tokio::test]
    async fn test_two_clients_converge_through_server() {
        let (url, hub, _temp) = start(false).await;

        let mut alice = client(&url).await;
        alice.connect().await.unwrap();
        let mut bob = client(&url).await;
        bob.connect().await.unwrap();
        assert_eq!(bob.status(), SyncStatus::Online);

        let list_id = alice
            .execute(Command::CreateList {
                name: "Shared".into(),
            })
            .unwrap()
            .unwrap()
            .id;
        alice.settle().await;
        assert!(hub.document().await.contains_key(&list_id));

        let mut received = false;
        for _ in 0..100 {
            while bob.poll_remote() {}
            if bob.repository().list(&list_id).is_some() {
                received = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(received, "bob never saw alice's list");
        assert_eq!(alice.lists(), bob.lists());
    }

    #[tokio::test]
    async fn test_read_only_server_downgrades_client() {
        let (url, hub, _temp) = start(true).await;

        let mut engine = client(&url).await;
        let err = engine.connect().await.unwrap_err();
        assert!(matches!(err, SyncError::PermissionDenied(_)));
        assert!(engine.is_local_only());

        engine
            .execute(Command::CreateList {
                name: "Private".into(),
            })
            .unwrap();
        engine.settle().await;
        assert_eq!(engine.lists().len(), 1);
        assert!(hub.document().await.is_empty());
    }
}
