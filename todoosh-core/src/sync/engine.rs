//! The sync engine: owns the repository and keeps it in step with local
//! storage and the remote document.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use super::document;
use super::error::SyncError;
use super::policy::{self, SeedAction};
use super::remote::{RemoteDocument, RemoteStore, RemoteSubscription};
use super::retry::RetryPolicy;
use crate::events::{Event, EventBus, Subscription, SyncStatus};
use crate::models::List;
use crate::repository::{Change, Command, CommandError, Repository};
use crate::storage::LocalStore;

/// Reserved remote key used to test write permission.
pub const PROBE_KEY: &str = "_connection_test";

/// Connection lifecycle of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Syncing,
    Idle,
    Offline,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Syncing => write!(f, "syncing"),
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::Offline => write!(f, "offline"),
            ConnectionState::Error => write!(f, "error"),
        }
    }
}

/// Tunables for remote operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Attempts per remote operation, the first one included.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub retry_delay: Duration,
    pub probe_key: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            probe_key: PROBE_KEY.to_string(),
        }
    }
}

impl SyncOptions {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_delay)
    }
}

type PushResult = Result<(), SyncError>;

pub struct SyncEngine {
    repo: Repository,
    store: Box<dyn LocalStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    events: EventBus,
    options: SyncOptions,
    state: ConnectionState,
    last_status: Option<SyncStatus>,
    /// Set after a permission denial; the remote is ignored for the rest of
    /// the session.
    local_only: bool,
    /// Seed reconciliation runs once per session; later reconnects resync.
    seeded: bool,
    /// Local state holds changes the remote has not acknowledged.
    dirty: bool,
    subscription: Option<RemoteSubscription>,
    pushes: JoinSet<PushResult>,
}

impl SyncEngine {
    /// Creates an engine over whatever the local store holds.
    pub fn new(store: impl LocalStore + 'static, options: SyncOptions) -> Self {
        let lists = store.load();
        debug!("Loaded {} lists from local storage", lists.len());
        Self {
            repo: Repository::from_lists(lists),
            store: Box::new(store),
            remote: None,
            events: EventBus::default(),
            options,
            state: ConnectionState::Disconnected,
            last_status: None,
            local_only: false,
            seeded: false,
            dirty: false,
            subscription: None,
            pushes: JoinSet::new(),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn lists(&self) -> &[List] {
        self.repo.lists()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Status as shown to the user.
    pub fn status(&self) -> SyncStatus {
        if self.local_only {
            return SyncStatus::PermissionDenied;
        }
        match self.state {
            ConnectionState::Idle | ConnectionState::Connected => SyncStatus::Online,
            ConnectionState::Connecting | ConnectionState::Syncing => SyncStatus::Syncing,
            ConnectionState::Disconnected | ConnectionState::Offline => SyncStatus::Offline,
            ConnectionState::Error => SyncStatus::Error,
        }
    }

    pub fn is_local_only(&self) -> bool {
        self.local_only
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Applies a command, persists the result and pushes it to the remote.
    ///
    /// Validation and lookup failures are returned without touching storage.
    /// The push runs in the background; see [`settle`](Self::settle).
    pub fn execute(&mut self, command: Command) -> Result<Option<Change>, CommandError> {
        let change = self.repo.apply(command)?;
        if let Some(change) = &change {
            debug!(?change, "Applied command");
            self.persist();
            self.events.emit(Event::EntityChanged(change.clone()));
            self.push();
        }
        Ok(change)
    }

    /// Connects to the remote and performs seed reconciliation.
    ///
    /// Seeding only happens on the first successful connect. A reconnect
    /// pushes local changes the remote missed, or else adopts whatever the
    /// remote holds now.
    ///
    /// Failures are also reflected in [`state`](Self::state); a permission
    /// denial switches the engine to local-only mode for the session.
    pub async fn connect(&mut self) -> Result<(), SyncError> {
        let Some(remote) = self.remote.clone() else {
            return Err(SyncError::NotConnected);
        };
        if self.local_only {
            debug!("Local-only session, not connecting");
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        let reachable = *remote.connectivity().borrow();
        if !reachable {
            return Err(self.connect_failed(SyncError::NotConnected));
        }

        if let Err(e) = self.probe(remote.as_ref()).await {
            return Err(self.connect_failed(e));
        }
        self.set_state(ConnectionState::Connected);

        match remote.subscribe().await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => return Err(self.connect_failed(e)),
        }

        let reconciled = if self.seeded {
            self.resync(&remote).await
        } else {
            self.seed(&remote).await
        };
        if let Err(e) = reconciled {
            return Err(self.connect_failed(e));
        }
        self.seeded = true;
        self.dirty = false;

        self.set_state(ConnectionState::Idle);
        info!("Sync connected ({} lists)", self.repo.lists().len());
        Ok(())
    }

    /// Confirms write access by writing and deleting a throwaway entry.
    async fn probe(&self, remote: &dyn RemoteStore) -> Result<(), SyncError> {
        let key = &self.options.probe_key;
        let marker = json!({ "timestamp": Utc::now().timestamp_millis() });
        remote.put_entry(key, marker).await?;
        remote.remove_entry(key).await
    }

    async fn seed(&mut self, remote: &Arc<dyn RemoteStore>) -> Result<(), SyncError> {
        let retry = self.options.retry_policy();
        let snapshot = retry
            .run(|| {
                let remote = remote.clone();
                async move { remote.fetch_all().await }
            })
            .await?;
        let incoming = document::decode(&snapshot, &self.options.probe_key);

        match policy::seed_action(!self.repo.is_empty(), !incoming.is_empty()) {
            SeedAction::KeepEmpty => debug!("Nothing to seed"),
            SeedAction::AdoptRemote => {
                info!("Adopting {} lists from remote", incoming.len());
                if !policy::is_same_snapshot(self.repo.lists(), &incoming) {
                    self.adopt(incoming);
                }
            }
            SeedAction::PushLocal => {
                info!("Remote is empty, pushing {} local lists", self.repo.lists().len());
                self.push_all(remote).await?;
            }
        }
        Ok(())
    }

    async fn resync(&mut self, remote: &Arc<dyn RemoteStore>) -> Result<(), SyncError> {
        if self.dirty {
            info!("Pushing {} lists changed while disconnected", self.repo.lists().len());
            return self.push_all(remote).await;
        }
        let retry = self.options.retry_policy();
        let snapshot = retry
            .run(|| {
                let remote = remote.clone();
                async move { remote.fetch_all().await }
            })
            .await?;
        self.handle_remote_document(&snapshot);
        Ok(())
    }

    /// Overwrites the remote with the whole local collection.
    async fn push_all(&mut self, remote: &Arc<dyn RemoteStore>) -> Result<(), SyncError> {
        self.set_state(ConnectionState::Syncing);
        let document = document::encode(self.repo.lists());
        self.options
            .retry_policy()
            .run(|| {
                let remote = remote.clone();
                let document = document.clone();
                async move { remote.set_all(document).await }
            })
            .await
    }

    fn connect_failed(&mut self, error: SyncError) -> SyncError {
        self.subscription = None;
        match &error {
            SyncError::PermissionDenied(reason) => self.enter_local_only(reason),
            SyncError::NotConnected => {
                info!("Remote unreachable, working offline");
                self.set_state(ConnectionState::Offline);
            }
            other => {
                warn!("Sync connection failed: {}", other);
                self.set_state(ConnectionState::Error);
            }
        }
        error
    }

    fn enter_local_only(&mut self, reason: &str) {
        warn!("Remote denied write access ({}), continuing local-only", reason);
        self.local_only = true;
        self.subscription = None;
        self.set_state(ConnectionState::Offline);
    }

    /// Applies a full remote document. Returns `true` if local state changed.
    pub fn handle_remote_document(&mut self, document: &RemoteDocument) -> bool {
        if self.local_only {
            return false;
        }
        let incoming = document::decode(document, &self.options.probe_key);
        if policy::is_same_snapshot(self.repo.lists(), &incoming) {
            debug!("Remote document matches local state");
            return false;
        }
        info!("Replacing local state with remote ({} lists)", incoming.len());
        self.adopt(incoming);
        true
    }

    /// Reacts to the remote becoming reachable or unreachable.
    pub async fn handle_connectivity(&mut self, online: bool) {
        if self.local_only || self.remote.is_none() {
            return;
        }
        if online {
            if matches!(
                self.state,
                ConnectionState::Disconnected | ConnectionState::Offline | ConnectionState::Error
            ) {
                info!("Connectivity restored, reconnecting");
                if let Err(e) = self.connect().await {
                    debug!("Reconnect failed: {}", e);
                }
            }
        } else if self.state != ConnectionState::Offline {
            info!("Connectivity lost, working offline");
            self.subscription = None;
            self.set_state(ConnectionState::Offline);
        }
    }

    /// Stops listening to the remote. Local state is left as it is.
    pub async fn disconnect(&mut self) {
        if self.subscription.take().is_some() {
            if let Some(remote) = &self.remote {
                if let Err(e) = remote.unsubscribe().await {
                    debug!("Unsubscribe failed: {}", e);
                }
            }
        }
        if self.state != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Waits for every outstanding push to finish.
    pub async fn settle(&mut self) {
        while let Some(result) = self.pushes.join_next().await {
            self.push_finished(result);
        }
    }

    /// Handles the next remote notification, if one is queued.
    ///
    /// Returns `true` if a document was received (changed or not).
    pub fn poll_remote(&mut self) -> bool {
        let Some(subscription) = self.subscription.as_mut() else {
            return false;
        };
        match subscription.try_next() {
            Some(document) => {
                self.handle_remote_document(&document);
                true
            }
            None => false,
        }
    }

    /// Drives the engine until the command channel closes.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        let mut connectivity = self.remote.as_ref().map(|remote| remote.connectivity());

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Err(e) = self.execute(command) {
                            warn!("Rejected command: {}", e);
                        }
                    }
                    None => break,
                },
                document = next_document(&mut self.subscription) => match document {
                    Some(document) => {
                        self.handle_remote_document(&document);
                    }
                    None => {
                        warn!("Remote subscription closed");
                        self.subscription = None;
                    }
                },
                online = next_connectivity(&mut connectivity) => {
                    self.handle_connectivity(online).await;
                }
                Some(result) = self.pushes.join_next(), if !self.pushes.is_empty() => {
                    self.push_finished(result);
                }
            }
        }

        self.settle().await;
    }

    fn push(&mut self) {
        if self.local_only {
            return;
        }
        let Some(remote) = self.remote.clone() else {
            return;
        };
        if !matches!(self.state, ConnectionState::Idle | ConnectionState::Syncing) {
            debug!("Not connected ({}), change kept local", self.state);
            self.dirty = true;
            return;
        }

        let document = document::encode(self.repo.lists());
        let retry = self.options.retry_policy();
        self.pushes.spawn(async move {
            retry
                .run(|| {
                    let remote = remote.clone();
                    let document = document.clone();
                    async move { remote.set_all(document).await }
                })
                .await
        });
        self.set_state(ConnectionState::Syncing);
    }

    fn push_finished(&mut self, result: Result<PushResult, JoinError>) {
        match result {
            Ok(Ok(())) => {
                debug!("Push completed");
                self.dirty = false;
            }
            Ok(Err(SyncError::PermissionDenied(reason))) => self.enter_local_only(&reason),
            // Local copy stays the source of truth until the next push or reconnect
            Ok(Err(e)) => {
                warn!("Push failed: {}", e);
                self.dirty = true;
            }
            Err(e) => {
                warn!("Push task failed: {}", e);
                self.dirty = true;
            }
        }
        if self.pushes.is_empty() && self.state == ConnectionState::Syncing {
            self.set_state(ConnectionState::Idle);
        }
    }

    fn adopt(&mut self, lists: Vec<List>) {
        self.repo.replace(lists);
        self.persist();
        self.events.emit(Event::CollectionReplaced);
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(self.repo.lists()) {
            warn!("Failed to save local data: {}", e);
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Sync state {} -> {}", self.state, state);
        }
        self.state = state;
        let status = self.status();
        if self.last_status != Some(status) {
            self.last_status = Some(status);
            self.events.emit(Event::StatusChanged(status));
        }
    }
}

async fn next_document(subscription: &mut Option<RemoteSubscription>) -> Option<RemoteDocument> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}

async fn next_connectivity(receiver: &mut Option<watch::Receiver<bool>>) -> bool {
    let Some(watch) = receiver.as_mut() else {
        return std::future::pending().await;
    };
    if watch.changed().await.is_ok() {
        return *watch.borrow_and_update();
    }
    *receiver = None;
    std::future::pending().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use crate::storage::MemoryStore;
    use crate::sync::MemoryRemote;

    fn fast_options() -> SyncOptions {
        SyncOptions {
            retry_delay: Duration::from_millis(1),
            ..SyncOptions::default()
        }
    }

    fn engine_with(remote: &MemoryRemote) -> (SyncEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(store.clone(), fast_options())
            .with_remote(Arc::new(remote.clone()));
        (engine, store)
    }

    fn create_list(engine: &mut SyncEngine, name: &str) -> String {
        engine
            .execute(Command::CreateList { name: name.into() })
            .unwrap()
            .unwrap()
            .id
    }

    fn statuses(events: Vec<Event>) -> Vec<SyncStatus> {
        events
            .into_iter()
            .filter_map(|event| match event {
                Event::StatusChanged(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_local_only_engine_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = SyncEngine::new(store.clone(), SyncOptions::default());
        let mut events = engine.subscribe();

        let id = create_list(&mut engine, "Groceries");

        assert!(store.raw().unwrap().contains(&id));
        assert!(matches!(events.try_recv(), Some(Event::EntityChanged(_))));
        assert_eq!(engine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_rejected_command_has_no_side_effects() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = SyncEngine::new(store.clone(), SyncOptions::default());
        let mut events = engine.subscribe();

        let result = engine.execute(Command::CreateList { name: "  ".into() });

        assert!(matches!(result, Err(CommandError::Validation(_))));
        assert!(store.raw().is_none());
        assert!(events.try_recv().is_none());
    }

    #[test]
    fn test_engine_loads_existing_data() {
        let store = Arc::new(MemoryStore::new());
        let mut first = SyncEngine::new(store.clone(), SyncOptions::default());
        create_list(&mut first, "Kept");

        let second = SyncEngine::new(store, SyncOptions::default());
        assert_eq!(second.lists().len(), 1);
        assert_eq!(second.lists()[0].name(), "Kept");
    }

    #[tokio::test]
    async fn test_connect_reports_online() {
        let remote = MemoryRemote::new();
        let (mut engine, _store) = engine_with(&remote);
        let mut events = engine.subscribe();

        engine.connect().await.unwrap();

        assert_eq!(engine.state(), ConnectionState::Idle);
        assert!(engine.is_subscribed());
        assert_eq!(
            statuses(events.drain()),
            vec![SyncStatus::Syncing, SyncStatus::Online]
        );
        // Probe entry is cleaned up
        assert!(remote.document().is_empty());
    }

    #[tokio::test]
    async fn test_mutation_is_pushed() {
        let remote = MemoryRemote::new();
        let (mut engine, _store) = engine_with(&remote);
        engine.connect().await.unwrap();

        let id = create_list(&mut engine, "Shared");
        assert_eq!(engine.state(), ConnectionState::Syncing);
        engine.settle().await;

        assert_eq!(engine.state(), ConnectionState::Idle);
        assert!(remote.document().contains_key(&id));
    }

    #[tokio::test]
    async fn test_transient_push_failure_keeps_local_state() {
        let remote = MemoryRemote::new();
        let (mut engine, store) = engine_with(&remote);
        engine.connect().await.unwrap();

        remote.fail_next(10);
        let first = create_list(&mut engine, "First");
        engine.settle().await;

        assert_eq!(engine.state(), ConnectionState::Idle);
        assert!(!remote.document().contains_key(&first));
        assert!(store.raw().unwrap().contains(&first));

        // The next push carries everything
        remote.fail_next(0);
        let second = create_list(&mut engine, "Second");
        engine.settle().await;
        let document = remote.document();
        assert!(document.contains_key(&first));
        assert!(document.contains_key(&second));
    }

    #[tokio::test]
    async fn test_permission_denied_downgrades_to_local_only() {
        let remote = MemoryRemote::new();
        remote.set_read_only(true);
        let (mut engine, store) = engine_with(&remote);
        let mut events = engine.subscribe();

        let err = engine.connect().await.unwrap_err();
        assert!(matches!(err, SyncError::PermissionDenied(_)));
        assert!(engine.is_local_only());
        assert_eq!(engine.status(), SyncStatus::PermissionDenied);
        assert!(statuses(events.drain()).contains(&SyncStatus::PermissionDenied));

        let id = create_list(&mut engine, "Private");
        engine.settle().await;
        assert!(store.raw().unwrap().contains(&id));
        assert_eq!(remote.write_count(), 0);

        // Stays local-only for the session
        remote.set_read_only(false);
        engine.handle_connectivity(true).await;
        engine.connect().await.unwrap();
        assert!(engine.is_local_only());
        assert!(!engine.is_subscribed());
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_remote_is_offline() {
        let remote = MemoryRemote::new();
        remote.set_connected(false);
        let (mut engine, _store) = engine_with(&remote);

        assert_eq!(engine.connect().await, Err(SyncError::NotConnected));
        assert_eq!(engine.state(), ConnectionState::Offline);
        assert_eq!(engine.status(), SyncStatus::Offline);
    }

    #[tokio::test]
    async fn test_connectivity_loss_and_reconnect() {
        let remote = MemoryRemote::new();
        let (mut engine, _store) = engine_with(&remote);
        engine.connect().await.unwrap();

        remote.set_connected(false);
        engine.handle_connectivity(false).await;
        assert_eq!(engine.state(), ConnectionState::Offline);
        assert!(!engine.is_subscribed());

        let id = create_list(&mut engine, "Offline edit");
        engine.settle().await;
        assert!(remote.document().is_empty());

        remote.set_connected(true);
        engine.handle_connectivity(true).await;
        assert_eq!(engine.state(), ConnectionState::Idle);
        assert!(engine.is_subscribed());
        assert!(remote.document().contains_key(&id));
    }

    #[tokio::test]
    async fn test_offline_edit_survives_reconnect_to_populated_remote() {
        let shared = List::new("Shared", 0).unwrap();
        let remote = MemoryRemote::with_document(document::encode(&[shared]));
        let (mut engine, store) = engine_with(&remote);
        engine.connect().await.unwrap();
        assert_eq!(engine.lists().len(), 1);

        remote.set_connected(false);
        engine.handle_connectivity(false).await;
        let id = create_list(&mut engine, "Made offline");

        remote.set_connected(true);
        engine.handle_connectivity(true).await;

        assert_eq!(engine.state(), ConnectionState::Idle);
        assert!(engine.repository().list(&id).is_some());
        assert!(store.raw().unwrap().contains(&id));
        let document = remote.document();
        assert_eq!(document.len(), 2);
        assert!(document.contains_key(&id));
    }

    #[tokio::test]
    async fn test_failed_push_is_retried_on_reconnect() {
        let shared = List::new("Shared", 0).unwrap();
        let remote = MemoryRemote::with_document(document::encode(&[shared]));
        let (mut engine, _store) = engine_with(&remote);
        engine.connect().await.unwrap();

        remote.fail_next(10);
        let id = create_list(&mut engine, "Unlucky");
        engine.settle().await;
        assert!(!remote.document().contains_key(&id));

        remote.fail_next(0);
        remote.set_connected(false);
        engine.handle_connectivity(false).await;
        remote.set_connected(true);
        engine.handle_connectivity(true).await;

        assert!(remote.document().contains_key(&id));
        assert_eq!(engine.lists().len(), 2);
    }

    #[tokio::test]
    async fn test_clean_reconnect_adopts_remote_changes() {
        let remote = MemoryRemote::new();
        let other = remote.peer();
        let (mut engine, _store) = engine_with(&remote);
        engine.connect().await.unwrap();
        create_list(&mut engine, "Mine");
        engine.settle().await;

        remote.set_connected(false);
        engine.handle_connectivity(false).await;
        let theirs = List::new("Theirs", 0).unwrap();
        other.publish(document::encode(&[theirs]));

        remote.set_connected(true);
        engine.handle_connectivity(true).await;

        assert_eq!(engine.lists().len(), 1);
        assert_eq!(engine.lists()[0].name(), "Theirs");
    }

    #[tokio::test]
    async fn test_failed_reconnect_can_be_retried() {
        let remote = MemoryRemote::new();
        let (mut engine, _store) = engine_with(&remote);
        engine.connect().await.unwrap();

        remote.set_connected(false);
        engine.handle_connectivity(false).await;
        let id = create_list(&mut engine, "Pending");

        remote.set_connected(true);
        remote.fail_next(1);
        engine.handle_connectivity(true).await;
        assert_eq!(engine.state(), ConnectionState::Error);
        assert!(!remote.document().contains_key(&id));

        engine.handle_connectivity(true).await;
        assert_eq!(engine.state(), ConnectionState::Idle);
        assert!(remote.document().contains_key(&id));
    }

    #[tokio::test]
    async fn test_identical_remote_document_is_ignored() {
        let remote = MemoryRemote::new();
        let (mut engine, _store) = engine_with(&remote);
        engine.connect().await.unwrap();
        create_list(&mut engine, "Same");
        engine.settle().await;

        let mut events = engine.subscribe();
        assert!(!engine.handle_remote_document(&remote.document()));
        assert!(events.drain().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let remote = MemoryRemote::new();
        let (mut engine, _store) = engine_with(&remote);
        engine.connect().await.unwrap();
        create_list(&mut engine, "Keep me");
        engine.settle().await;

        engine.disconnect().await;
        engine.disconnect().await;

        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(remote.subscriber_count(), 0);
        assert_eq!(engine.lists().len(), 1);
    }

    #[tokio::test]
    async fn test_run_loop_applies_commands_and_notifications() {
        let remote = MemoryRemote::new();
        let other = remote.peer();
        let (mut engine, _store) = engine_with(&remote);
        engine.connect().await.unwrap();

        let mut events = engine.subscribe();
        let (tx, rx) = mpsc::channel(8);

        let driver = async move {
            tx.send(Command::CreateList { name: "Mine".into() })
                .await
                .unwrap();
            // Wait for the push to land
            while events.recv().await != Some(Event::StatusChanged(SyncStatus::Online)) {}

            let mut theirs = List::new("Theirs", 0).unwrap();
            theirs.add_todo("from elsewhere").unwrap();
            other.publish(document::encode(&[theirs]));
            while events.recv().await != Some(Event::CollectionReplaced) {}
        };

        tokio::join!(engine.run(rx), driver);

        assert_eq!(engine.lists().len(), 1);
        assert_eq!(engine.lists()[0].name(), "Theirs");
        assert_eq!(engine.state(), ConnectionState::Idle);
    }
}
