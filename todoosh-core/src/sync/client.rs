//! WebSocket client for the Todoosh sync server.
//!
//! A background supervisor keeps one connection open, reconnecting with
//! bounded exponential backoff. Requests are matched to replies by request
//! id; `changed` pushes from the server fan out to subscriptions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::error::SyncError;
use super::protocol::{ClientMessage, ServerMessage};
use super::remote::{RemoteDocument, RemoteStore, RemoteSubscription};

/// How long a request waits for its reply.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// First reconnect delay; doubles per consecutive failure.
const RECONNECT_BASE: Duration = Duration::from_millis(500);
/// Upper bound on the reconnect delay.
const RECONNECT_MAX: Duration = Duration::from_secs(30);
const CHANGE_BUFFER: usize = 32;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Inner {
    url: String,
    outgoing: Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<ServerMessage>>>,
    next_id: AtomicU64,
    changes: broadcast::Sender<RemoteDocument>,
    connected: watch::Sender<bool>,
    subscribed: AtomicBool,
}

/// Remote store backed by a WebSocket connection.
pub struct WsRemote {
    inner: Arc<Inner>,
    shutdown: watch::Sender<bool>,
}

impl WsRemote {
    /// Starts connecting to `server_url` in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(server_url: &str) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        let (connected, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            url: build_ws_url(server_url),
            outgoing: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            changes,
            connected,
            subscribed: AtomicBool::new(false),
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(supervise(inner.clone(), shutdown_rx));

        Self { inner, shutdown }
    }

    /// Returns the WebSocket URL in use.
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// Waits until the connection is up, or `limit` elapses.
    pub async fn wait_connected(&self, limit: Duration) -> bool {
        let mut connectivity = self.inner.connected.subscribe();
        timeout(limit, connectivity.wait_for(|up| *up))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    async fn request(
        &self,
        build: impl FnOnce(u64) -> ClientMessage,
    ) -> Result<ServerMessage, SyncError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let outgoing = self
                .inner
                .outgoing
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let Some(sender) = outgoing.as_ref() else {
                return Err(SyncError::NotConnected);
            };
            self.inner
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(id, reply_tx);
            if sender.send(build(id)).is_err() {
                self.inner.take_pending(id);
                return Err(SyncError::NotConnected);
            }
        }

        match timeout(REQUEST_TIMEOUT, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            // Connection dropped while waiting
            Ok(Err(_)) => Err(SyncError::NotConnected),
            Err(_) => {
                self.inner.take_pending(id);
                Err(SyncError::Transient(format!(
                    "No reply within {:?}",
                    REQUEST_TIMEOUT
                )))
            }
        }
    }
}

impl Drop for WsRemote {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

impl std::fmt::Debug for WsRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsRemote")
            .field("url", &self.inner.url)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl RemoteStore for WsRemote {
    async fn fetch_all(&self) -> Result<RemoteDocument, SyncError> {
        self.request(|request_id| ClientMessage::ReadAll { request_id })
            .await?
            .into_snapshot()
    }

    async fn set_all(&self, document: RemoteDocument) -> Result<(), SyncError> {
        self.request(|request_id| ClientMessage::SetAll {
            request_id,
            document,
        })
        .await?
        .into_ack()
    }

    async fn put_entry(&self, key: &str, value: Value) -> Result<(), SyncError> {
        self.request(|request_id| ClientMessage::Put {
            request_id,
            key: key.to_string(),
            value,
        })
        .await?
        .into_ack()
    }

    async fn remove_entry(&self, key: &str) -> Result<(), SyncError> {
        self.request(|request_id| ClientMessage::Remove {
            request_id,
            key: key.to_string(),
        })
        .await?
        .into_ack()
    }

    async fn subscribe(&self) -> Result<RemoteSubscription, SyncError> {
        let receiver = self.inner.changes.subscribe();
        self.request(|request_id| ClientMessage::Subscribe { request_id })
            .await?
            .into_ack()?;
        self.inner.subscribed.store(true, Ordering::SeqCst);
        Ok(RemoteSubscription::new(receiver))
    }

    async fn unsubscribe(&self) -> Result<(), SyncError> {
        if !self.inner.subscribed.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        match self
            .request(|request_id| ClientMessage::Unsubscribe { request_id })
            .await
        {
            Ok(reply) => reply.into_ack(),
            // The server forgets subscriptions with the connection
            Err(SyncError::NotConnected) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn connectivity(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }
}

impl Inner {
    fn take_pending(&self, id: u64) -> Option<oneshot::Sender<ServerMessage>> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }

    fn set_outgoing(&self, sender: Option<mpsc::UnboundedSender<ClientMessage>>) {
        *self.outgoing.lock().unwrap_or_else(|e| e.into_inner()) = sender;
    }

    /// Routes one frame from the server.
    fn dispatch(&self, data: &[u8]) {
        let message = match ServerMessage::decode(data) {
            Ok(message) => message,
            Err(e) => {
                warn!("Ignoring undecodable frame: {}", e);
                return;
            }
        };

        if let ServerMessage::Changed { document } = message {
            debug!("Remote document changed ({} entries)", document.len());
            let _ = self.changes.send(document);
            return;
        }

        match message.request_id().and_then(|id| self.take_pending(id)) {
            Some(reply) => {
                let _ = reply.send(message);
            }
            None => debug!("Reply without a waiting request: {:?}", message),
        }
    }
}

/// Keeps a connection open until the owning [`WsRemote`] is dropped.
async fn supervise(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut failures: u32 = 0;
    loop {
        if *shutdown.borrow() {
            break;
        }

        match connect_async(&inner.url).await {
            Ok((stream, _)) => {
                failures = 0;
                info!("Connected to {}", inner.url);
                run_connection(&inner, stream, &mut shutdown).await;
                info!("Disconnected from {}", inner.url);
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                debug!("Connection to {} failed: {}", inner.url, e);
            }
        }

        let delay = reconnect_delay(failures);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    debug!("Sync client for {} stopped", inner.url);
}

async fn run_connection(inner: &Inner, stream: WsStream, shutdown: &mut watch::Receiver<bool>) {
    let (mut sink, mut source) = stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ClientMessage>();

    // Server-side subscriptions die with the connection
    if inner.subscribed.load(Ordering::SeqCst) {
        let request_id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let _ = tx.send(ClientMessage::Subscribe { request_id });
    }
    inner.set_outgoing(Some(tx));
    inner.connected.send_replace(true);

    loop {
        tokio::select! {
            Some(message) = rx.recv() => {
                let encoded = match message.encode() {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        warn!("Failed to encode {:?}: {}", message, e);
                        inner.take_pending(message.request_id());
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Binary(encoded.into())).await {
                    warn!("WebSocket send failed: {}", e);
                    break;
                }
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Binary(data))) => inner.dispatch(&data),
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    break;
                }
            },
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    inner.set_outgoing(None);
    inner.connected.send_replace(false);
    // Dropping the senders fails every in-flight request
    inner
        .pending
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clear();
}

fn reconnect_delay(failures: u32) -> Duration {
    let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
    RECONNECT_BASE.saturating_mul(factor).min(RECONNECT_MAX)
}

/// Builds the WebSocket URL for the sync endpoint.
pub fn build_ws_url(server_url: &str) -> String {
    // Convert http(s) to ws(s) if needed
    let base_url = if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if !server_url.starts_with("ws://") && !server_url.starts_with("wss://") {
        format!("ws://{}", server_url)
    } else {
        server_url.to_string()
    };

    let base_url = base_url.trim_end_matches('/');
    if base_url.ends_with("/sync") {
        base_url.to_string()
    } else {
        format!("{}/sync", base_url)
    }
}
