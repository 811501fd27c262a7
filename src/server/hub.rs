//! WebSocket sync handler for the shared document.
//!
//! Every connection can read and write the document. After each successful
//! write the full document is broadcast to the other subscribed
//! connections; the writer gets an ack instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};

use todoosh_core::sync::{ClientMessage, ErrorCode, ServerMessage};
use todoosh_core::RemoteDocument;

use super::storage::DocumentStore;

/// Buffer size for the change channel.
const CHANGE_BUFFER: usize = 64;

/// A committed write and the connection that made it.
#[derive(Debug, Clone)]
pub struct DocumentChanged {
    pub origin: u64,
    pub document: RemoteDocument,
}

/// Owns the document and tracks connected clients for broadcasting updates.
pub struct SyncHub {
    store: RwLock<DocumentStore>,
    changes: broadcast::Sender<DocumentChanged>,
    read_only: bool,
    next_connection: AtomicU64,
}

impl SyncHub {
    pub fn new(store: DocumentStore, read_only: bool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            store: RwLock::new(store),
            changes,
            read_only,
            next_connection: AtomicU64::new(1),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub async fn document(&self) -> RemoteDocument {
        self.store.read().await.document().clone()
    }

    pub fn connection_id(&self) -> u64 {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    /// Subscribes to committed writes.
    pub fn changes(&self) -> broadcast::Receiver<DocumentChanged> {
        self.changes.subscribe()
    }

    /// Answers one request from `connection`.
    pub async fn handle(&self, connection: u64, message: ClientMessage) -> ServerMessage {
        let request_id = message.request_id();
        if message.is_write() && self.read_only {
            tracing::debug!("Rejected write from connection {}", connection);
            return ServerMessage::error(
                Some(request_id),
                ErrorCode::PermissionDenied,
                "server is read-only",
            );
        }

        match message {
            ClientMessage::ReadAll { .. } => ServerMessage::Snapshot {
                request_id,
                document: self.document().await,
            },
            ClientMessage::SetAll { document, .. } => {
                self.write(connection, request_id, |current| *current = document)
                    .await
            }
            ClientMessage::Put { key, value, .. } => {
                self.write(connection, request_id, |current| {
                    current.insert(key, value);
                })
                .await
            }
            ClientMessage::Remove { key, .. } => {
                self.write(connection, request_id, |current| {
                    current.remove(&key);
                })
                .await
            }
            ClientMessage::Subscribe { .. } | ClientMessage::Unsubscribe { .. } => {
                ServerMessage::Ack { request_id }
            }
        }
    }

    async fn write(
        &self,
        connection: u64,
        request_id: u64,
        change: impl FnOnce(&mut RemoteDocument),
    ) -> ServerMessage {
        // Broadcast under the lock so subscribers see writes in commit order
        let mut store = self.store.write().await;
        match store.update(change) {
            Ok(document) => {
                tracing::debug!(
                    "Connection {} wrote document ({} entries)",
                    connection,
                    document.len()
                );
                // Ignore send errors (no subscribers)
                let _ = self.changes.send(DocumentChanged {
                    origin: connection,
                    document,
                });
                ServerMessage::Ack { request_id }
            }
            Err(e) => {
                tracing::error!("Failed to store document: {}", e);
                ServerMessage::error(Some(request_id), ErrorCode::Internal, e.to_string())
            }
        }
    }
}

/// Serves one client until it disconnects.
pub async fn serve(socket: WebSocket, hub: Arc<SyncHub>) {
    let connection = hub.connection_id();
    let (mut sender, mut receiver) = socket.split();
    let mut changes = hub.changes();
    let mut subscribed = false;
    tracing::info!("Connection {} opened", connection);

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        tracing::debug!("Connection {} failed: {}", connection, e);
                        break;
                    }
                    None => break,
                };
                let reply = match frame {
                    Message::Binary(data) => match ClientMessage::decode(&data) {
                        Ok(message) => {
                            match &message {
                                ClientMessage::Subscribe { .. } => subscribed = true,
                                ClientMessage::Unsubscribe { .. } => subscribed = false,
                                _ => {}
                            }
                            hub.handle(connection, message).await
                        }
                        Err(e) => ServerMessage::error(
                            None,
                            ErrorCode::Invalid,
                            format!("Undecodable message: {}", e),
                        ),
                    },
                    Message::Text(_) => {
                        ServerMessage::error(None, ErrorCode::Invalid, "Expected binary frames")
                    }
                    Message::Close(_) => break,
                    Message::Ping(_) | Message::Pong(_) => continue,
                };
                if send(&mut sender, &reply).await.is_err() {
                    break;
                }
            }
            change = changes.recv() => {
                let document = match change {
                    Ok(change) if subscribed && change.origin != connection => change.document,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) if subscribed => {
                        // Each change carries the whole document, so the latest is enough
                        tracing::debug!("Connection {} lagged by {} changes", connection, skipped);
                        hub.document().await
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                };
                if send(&mut sender, &ServerMessage::Changed { document }).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!("Connection {} closed", connection);
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    match message.encode() {
        Ok(data) => sender.send(Message::Binary(data.into())).await,
        Err(e) => {
            tracing::error!("Failed to encode reply: {}", e);
            Ok(())
        }
    }
}
