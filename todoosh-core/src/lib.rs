//! Todoosh Core Library
//!
//! Local-first list model, ordering engine and remote sync for Todoosh
//! applications.

pub mod events;
pub mod models;
pub mod ordering;
pub mod repository;
pub mod storage;
pub mod sync;
pub mod validation;

pub use events::{Event, EventBus, Subscription, SyncStatus};
pub use models::{Filter, List, Subtask, Todo};
pub use ordering::Ordered;
pub use repository::{Change, ChangeKind, Command, CommandError, EntityKind, Repository};
pub use storage::{FileStore, LocalStore, MemoryStore, StorageError, STORAGE_KEY};
pub use sync::{
    ConnectionState, MemoryRemote, RemoteDocument, RemoteStore, RetryPolicy, SyncEngine,
    SyncError, SyncOptions, WsRemote,
};
pub use validation::ValidationError;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
