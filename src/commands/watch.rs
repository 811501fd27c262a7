//! Long-running session: applies commands read from stdin and prints every
//! engine event, including changes made by other devices.

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use todoosh_core::{Change, Command, Event, Subscription};

use super::{finish, open_engine, CliError};
use crate::config::Config;

/// Watch for changes and apply JSON commands from stdin
///
/// Each input line is one command, e.g.
/// {"command":"create-todo","listId":"<id>","text":"milk"}
#[derive(Args)]
pub struct WatchCommand {
    /// Don't connect to the sync server
    #[arg(long)]
    offline: bool,
}

impl WatchCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CliError> {
        let mut engine = open_engine(config, !self.offline).await;
        println!("Watching ({}), Ctrl-D or Ctrl-C to stop", engine.status());

        let printer = tokio::spawn(print_events(engine.subscribe()));

        let (tx, rx) = mpsc::channel(32);
        let reader = tokio::spawn(read_commands(tx));

        engine.run(rx).await;
        reader.abort();
        finish(&mut engine).await;

        // Closing the event bus lets the printer drain what is left and exit
        drop(engine);
        if let Err(e) = printer.await {
            tracing::debug!("Event printer failed: {}", e);
        }
        Ok(())
    }
}

/// Prints events until the engine's event bus closes. Returns how many.
async fn print_events(mut events: Subscription) -> usize {
    let mut printed = 0;
    while let Some(event) = events.recv().await {
        println!("{}", describe(&event));
        printed += 1;
    }
    printed
}

/// Forwards parsed stdin lines until EOF or Ctrl-C.
async fn read_commands(tx: mpsc::Sender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line) {
            Ok(command) => {
                if tx.send(command).await.is_err() {
                    break;
                }
            }
            Err(e) => eprintln!("Ignoring invalid command: {}", e),
        }
    }
}

fn parse_command(line: &str) -> Result<Command, serde_json::Error> {
    serde_json::from_str(line.trim())
}

fn describe(event: &Event) -> String {
    match event {
        Event::StatusChanged(status) => format!("status: {}", status),
        Event::CollectionReplaced => "replaced: lists updated from server".to_string(),
        Event::EntityChanged(Change { kind, entity, id }) => {
            let kind = format!("{:?}", kind).to_lowercase();
            let entity = format!("{:?}", entity).to_lowercase();
            format!("{} {} {}", kind, entity, id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use todoosh_core::{ChangeKind, EntityKind, MemoryStore, SyncEngine, SyncOptions, SyncStatus};

    #[test]
    fn test_parse_command_line() {
        let command = parse_command(r#" {"command":"toggle-todo","id":"t1"} "#).unwrap();
        assert_eq!(command, Command::ToggleTodo { id: "t1".into() });

        assert!(parse_command(r#"{"command":"explode"}"#).is_err());
    }

    #[test]
    fn test_describe_events() {
        assert_eq!(
            describe(&Event::StatusChanged(SyncStatus::PermissionDenied)),
            "status: permission-denied"
        );
        let change = Change {
            kind: ChangeKind::Created,
            entity: EntityKind::Todo,
            id: "T1".into(),
        };
        assert_eq!(describe(&Event::EntityChanged(change)), "created todo T1");
    }

    #[tokio::test]
    async fn test_printer_drains_events_after_engine_is_dropped() {
        let mut engine = SyncEngine::new(MemoryStore::new(), SyncOptions::default());
        let events = engine.subscribe();
        engine
            .execute(Command::CreateList {
                name: "Last words".into(),
            })
            .unwrap();
        drop(engine);

        assert_eq!(print_events(events).await, 1);
    }
}
