//! The remote store contract and an in-process implementation.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use super::error::SyncError;

/// The shared remote document: list id to list payload.
pub type RemoteDocument = Map<String, Value>;

/// Buffer size for per-subscriber change channels.
const CHANGE_BUFFER: usize = 32;

/// A shared document store reachable over the network.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// One-shot read of the whole document.
    async fn fetch_all(&self) -> Result<RemoteDocument, SyncError>;

    /// Overwrites the whole document.
    async fn set_all(&self, document: RemoteDocument) -> Result<(), SyncError>;

    async fn put_entry(&self, key: &str, value: Value) -> Result<(), SyncError>;

    async fn remove_entry(&self, key: &str) -> Result<(), SyncError>;

    /// Starts receiving the full document after every change made by
    /// another client.
    async fn subscribe(&self) -> Result<RemoteSubscription, SyncError>;

    async fn unsubscribe(&self) -> Result<(), SyncError> {
        Ok(())
    }

    /// Current and future reachability of the remote.
    fn connectivity(&self) -> watch::Receiver<bool>;
}

/// Stream of remote documents. Dropping it ends the subscription.
#[derive(Debug)]
pub struct RemoteSubscription {
    receiver: broadcast::Receiver<RemoteDocument>,
}

impl RemoteSubscription {
    pub fn new(receiver: broadcast::Receiver<RemoteDocument>) -> Self {
        Self { receiver }
    }

    /// Waits for the next document. When notifications were missed only the
    /// newest matters, since each one carries the whole document.
    pub async fn next(&mut self) -> Option<RemoteDocument> {
        loop {
            match self.receiver.recv().await {
                Ok(document) => return Some(document),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Skipped {} stale remote notifications", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns an already-delivered document without waiting.
    pub fn try_next(&mut self) -> Option<RemoteDocument> {
        loop {
            match self.receiver.try_recv() {
                Ok(document) => return Some(document),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

// =============================================================================
// In-memory remote
// =============================================================================

/// Sender id used by [`MemoryRemote::publish`].
const EXTERNAL_PEER: u64 = u64::MAX;

#[derive(Debug)]
struct Backend {
    document: Mutex<RemoteDocument>,
    subscribers: Mutex<Vec<(u64, broadcast::Sender<RemoteDocument>)>>,
    connected: watch::Sender<bool>,
    read_only: AtomicBool,
    fail_next: AtomicUsize,
    writes: AtomicUsize,
    next_peer: AtomicU64,
}

/// A remote document living in process memory.
///
/// Each handle is one client. Clones share the same client identity; use
/// [`peer`](MemoryRemote::peer) for a second client on the same document.
/// A client is never notified of its own writes.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    backend: Arc<Backend>,
    peer: u64,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::with_document(RemoteDocument::new())
    }

    pub fn with_document(document: RemoteDocument) -> Self {
        let (connected, _) = watch::channel(true);
        Self {
            backend: Arc::new(Backend {
                document: Mutex::new(document),
                subscribers: Mutex::new(Vec::new()),
                connected,
                read_only: AtomicBool::new(false),
                fail_next: AtomicUsize::new(0),
                writes: AtomicUsize::new(0),
                next_peer: AtomicU64::new(1),
            }),
            peer: 0,
        }
    }

    /// Another client sharing this document.
    pub fn peer(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            peer: self.backend.next_peer.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn document(&self) -> RemoteDocument {
        self.backend
            .document
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replaces the document as if some other client wrote it.
    pub fn publish(&self, document: RemoteDocument) {
        *self
            .backend
            .document
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = document.clone();
        self.notify(EXTERNAL_PEER, document);
    }

    pub fn set_connected(&self, connected: bool) {
        self.backend.connected.send_replace(connected);
    }

    /// Rejects every write with a permission error.
    pub fn set_read_only(&self, read_only: bool) {
        self.backend.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Fails the next `count` operations with a transient error.
    pub fn fail_next(&self, count: usize) {
        self.backend.fail_next.store(count, Ordering::SeqCst);
    }

    /// Number of successful writes (probe writes included).
    pub fn write_count(&self) -> usize {
        self.backend.writes.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .backend
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|(_, sender)| sender.receiver_count() > 0);
        subscribers.len()
    }

    fn check_available(&self) -> Result<(), SyncError> {
        if !*self.backend.connected.borrow() {
            return Err(SyncError::NotConnected);
        }
        let injected = self
            .backend
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(SyncError::Transient("injected failure".to_string()));
        }
        Ok(())
    }

    fn write(&self, change: impl FnOnce(&mut RemoteDocument)) -> Result<(), SyncError> {
        self.check_available()?;
        if self.backend.read_only.load(Ordering::SeqCst) {
            return Err(SyncError::PermissionDenied(
                "remote is read-only".to_string(),
            ));
        }

        let document = {
            let mut document = self
                .backend
                .document
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            change(&mut document);
            document.clone()
        };
        self.backend.writes.fetch_add(1, Ordering::SeqCst);
        self.notify(self.peer, document);
        Ok(())
    }

    fn notify(&self, origin: u64, document: RemoteDocument) {
        let mut subscribers = self
            .backend
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|(_, sender)| sender.receiver_count() > 0);
        for (peer, sender) in subscribers.iter() {
            if *peer != origin {
                let _ = sender.send(document.clone());
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch_all(&self) -> Result<RemoteDocument, SyncError> {
        self.check_available()?;
        Ok(self.document())
    }

    async fn set_all(&self, document: RemoteDocument) -> Result<(), SyncError> {
        self.write(|current| *current = document)
    }

    async fn put_entry(&self, key: &str, value: Value) -> Result<(), SyncError> {
        self.write(|current| {
            current.insert(key.to_string(), value);
        })
    }

    async fn remove_entry(&self, key: &str) -> Result<(), SyncError> {
        self.write(|current| {
            current.remove(key);
        })
    }

    async fn subscribe(&self) -> Result<RemoteSubscription, SyncError> {
        self.check_available()?;
        let (sender, receiver) = broadcast::channel(CHANGE_BUFFER);
        self.backend
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((self.peer, sender));
        Ok(RemoteSubscription::new(receiver))
    }

    async fn unsubscribe(&self) -> Result<(), SyncError> {
        self.backend
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(peer, _)| *peer != self.peer);
        Ok(())
    }

    fn connectivity(&self) -> watch::Receiver<bool> {
        self.backend.connected.subscribe()
    }
}
