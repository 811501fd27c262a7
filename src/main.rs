use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{
    ConfigCommand, ListCommand, SubtaskCommand, SyncCommand, TodoCommand, WatchCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "todoosh")]
#[command(version)]
#[command(about = "A local-first todo list manager with sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage lists
    List(ListCommand),

    /// Manage todos
    Todo(TodoCommand),

    /// Manage subtasks
    Subtask(SubtaskCommand),

    /// Sync with the remote server
    Sync(SyncCommand),

    /// Apply commands from stdin and print live changes
    Watch(WatchCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so command output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todoosh=info,todoosh_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::List(cmd)) => cmd.run(&config).await?,
        Some(Commands::Todo(cmd)) => cmd.run(&config).await?,
        Some(Commands::Subtask(cmd)) => cmd.run(&config).await?,
        Some(Commands::Sync(cmd)) => cmd.run(&config).await?,
        Some(Commands::Watch(cmd)) => cmd.run(&config).await?,
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
