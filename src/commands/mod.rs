mod config_cmd;
mod list;
mod subtask;
mod sync_cmd;
mod todo;
mod watch;

pub use config_cmd::ConfigCommand;
pub use list::ListCommand;
pub use subtask::SubtaskCommand;
pub use sync_cmd::SyncCommand;
pub use todo::TodoCommand;
pub use watch::WatchCommand;

use clap::ValueEnum;
use std::sync::Arc;
use std::time::Duration;

use todoosh_core::{
    Change, Command, CommandError, FileStore, List, SyncEngine, Todo, WsRemote,
};

use crate::config::Config;

/// How long a command waits for the server before working offline.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Opens the local collection and, when `online` is set and a server is
/// configured, connects and seeds before returning.
pub async fn open_engine(config: &Config, online: bool) -> SyncEngine {
    let store = FileStore::new(&config.data_dir.value);
    let engine = SyncEngine::new(store, config.sync.options());

    let Some(server_url) = config.sync.server_url.as_deref() else {
        return engine;
    };
    if !online {
        return engine;
    }

    let remote = WsRemote::connect(server_url);
    if !remote.wait_connected(CONNECT_TIMEOUT).await {
        tracing::info!("Server {} not reachable, working offline", remote.url());
    }
    let mut engine = engine.with_remote(Arc::new(remote));
    if let Err(e) = engine.connect().await {
        tracing::warn!("Sync unavailable: {}", e);
    }
    engine
}

/// Opens the engine for a mutating command, connecting when auto-sync is on.
pub async fn open_for_update(config: &Config) -> SyncEngine {
    open_engine(config, config.sync.auto_sync).await
}

/// Applies a command. `None` means the command changed nothing.
pub fn apply(engine: &mut SyncEngine, command: Command) -> Result<Option<Change>, CliError> {
    engine.execute(command).map_err(CliError::Rejected)
}

/// Waits for pending pushes, then leaves the remote.
pub async fn finish(engine: &mut SyncEngine) {
    engine.settle().await;
    engine.disconnect().await;
}

/// Finds a list by id or, failing that, by case-insensitive name.
pub fn resolve_list<'a>(engine: &'a SyncEngine, identifier: &str) -> Result<&'a List, CliError> {
    let repo = engine.repository();
    if let Some(list) = repo.list(identifier) {
        return Ok(list);
    }

    let mut matches = repo
        .lists()
        .iter()
        .filter(|l| l.name().eq_ignore_ascii_case(identifier.trim()));
    match (matches.next(), matches.next()) {
        (Some(list), None) => Ok(list),
        (Some(_), Some(_)) => Err(CliError::Ambiguous(identifier.to_string())),
        (None, _) => Err(CliError::ListNotFound(identifier.to_string())),
    }
}

pub fn print_todo(todo: &Todo, indent: &str) {
    let mark = if todo.is_completed() { "x" } else { " " };
    let star = if todo.is_favorite() { " *" } else { "" };
    println!("{}[{}] {}{}  ({})", indent, mark, todo.text(), star, todo.id());
    for subtask in todo.subtasks() {
        let mark = if subtask.is_completed() { "x" } else { " " };
        println!(
            "{}    - [{}] {}  ({})",
            indent,
            mark,
            subtask.text(),
            subtask.id()
        );
    }
}

/// Errors from list, todo and subtask commands
#[derive(Debug)]
pub enum CliError {
    Rejected(CommandError),
    ListNotFound(String),
    TodoNotFound(String),
    Ambiguous(String),
    Output(serde_json::Error),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Rejected(e) => write!(f, "{}", e),
            CliError::ListNotFound(id) => write!(f, "List not found: {}", id),
            CliError::TodoNotFound(id) => write!(f, "Todo not found: {}", id),
            CliError::Ambiguous(name) => {
                write!(f, "More than one list is named '{}', use its id", name)
            }
            CliError::Output(e) => write!(f, "Failed to render output: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Rejected(e) => Some(e),
            CliError::Output(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e)
    }
}
