//! Change notifications for UI observers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::repository::Change;

/// User-visible sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    Online,
    Offline,
    Error,
    Syncing,
    PermissionDenied,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Online => write!(f, "online"),
            SyncStatus::Offline => write!(f, "offline"),
            SyncStatus::Error => write!(f, "error"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::PermissionDenied => write!(f, "permission-denied"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StatusChanged(SyncStatus),
    /// The whole collection was swapped for a remote snapshot.
    CollectionReplaced,
    EntityChanged(Change),
}

/// Event bus for broadcasting engine events.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: Event) {
        // No receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: Some(self.sender.subscribe()),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A handle on the event stream. Dropping it or calling
/// [`unsubscribe`](Subscription::unsubscribe) stops delivery.
#[derive(Debug)]
pub struct Subscription {
    receiver: Option<broadcast::Receiver<Event>>,
}

impl Subscription {
    /// Waits for the next event. Returns `None` once unsubscribed or when the
    /// bus is gone. Events missed while lagging are skipped.
    pub async fn recv(&mut self) -> Option<Event> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event subscriber lagged by {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drains every queued event.
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Stops delivery. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        self.receiver = None;
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_every_subscriber() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(Event::CollectionReplaced);

        assert_eq!(first.recv().await, Some(Event::CollectionReplaced));
        assert_eq!(second.recv().await, Some(Event::CollectionReplaced));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::default();
        bus.emit(Event::StatusChanged(SyncStatus::Online));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(bus.subscriber_count(), 0);

        bus.emit(Event::CollectionReplaced);
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_drain() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe();
        bus.emit(Event::StatusChanged(SyncStatus::Syncing));
        bus.emit(Event::StatusChanged(SyncStatus::Online));

        assert_eq!(
            sub.drain(),
            vec![
                Event::StatusChanged(SyncStatus::Syncing),
                Event::StatusChanged(SyncStatus::Online)
            ]
        );
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SyncStatus::PermissionDenied.to_string(), "permission-denied");
        assert_eq!(SyncStatus::Online.to_string(), "online");
    }
}
