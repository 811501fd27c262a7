use clap::{Args, Subcommand, ValueEnum};

use todoosh_core::{Command, Filter, List, SyncEngine};

use super::{
    apply, finish, open_engine, open_for_update, print_todo, resolve_list, CliError, OutputFormat,
};
use crate::config::Config;

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum FilterArg {
    #[default]
    All,
    Active,
    Completed,
}

impl From<FilterArg> for Filter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => Filter::All,
            FilterArg::Active => Filter::Active,
            FilterArg::Completed => Filter::Completed,
        }
    }
}

#[derive(Args)]
pub struct ListCommand {
    #[command(subcommand)]
    pub command: ListSubcommand,
}

#[derive(Subcommand)]
pub enum ListSubcommand {
    /// Create a new list
    Add {
        /// Name of the list
        name: String,
    },

    /// Rename a list
    Rename {
        /// List ID or name
        list: String,

        /// New name
        name: String,
    },

    /// Delete a list and everything in it
    Delete {
        /// List ID or name
        list: String,
    },

    /// Toggle a list's favorite flag
    Favorite {
        /// List ID or name
        list: String,
    },

    /// Move a list to a new position (0-based)
    Move {
        /// List ID or name
        list: String,

        /// Target position
        index: usize,
    },

    /// Show all lists, or the todos of one list
    Show {
        /// List ID or name (omit to show every list)
        list: Option<String>,

        /// Which todos to show
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove every completed todo from a list
    ClearCompleted {
        /// List ID or name
        list: String,
    },
}

impl ListCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CliError> {
        if let ListSubcommand::Show {
            list,
            filter,
            format,
        } = &self.command
        {
            let engine = open_engine(config, false).await;
            return match list {
                Some(identifier) => {
                    show_list(resolve_list(&engine, identifier)?, (*filter).into(), format)
                }
                None => show_all(engine.repository().display_lists(), format),
            };
        }

        let mut engine = open_for_update(config).await;
        let result = self.update(&mut engine);
        finish(&mut engine).await;
        result
    }

    fn update(&self, engine: &mut SyncEngine) -> Result<(), CliError> {
        match &self.command {
            ListSubcommand::Add { name } => {
                if let Some(change) = apply(engine, Command::CreateList { name: name.clone() })? {
                    println!("Created list {}", change.id);
                }
            }
            ListSubcommand::Rename { list, name } => {
                let id = resolve_list(engine, list)?.id().to_string();
                match apply(engine, Command::EditList { id, name: name.clone() })? {
                    Some(_) => println!("Renamed list to '{}'", name.trim()),
                    None => println!("Nothing to change"),
                }
            }
            ListSubcommand::Delete { list } => {
                let found = resolve_list(engine, list)?;
                let (id, name) = (found.id().to_string(), found.name().to_string());
                apply(engine, Command::DeleteList { id })?;
                println!("Deleted list '{}'", name);
            }
            ListSubcommand::Favorite { list } => {
                let id = resolve_list(engine, list)?.id().to_string();
                apply(engine, Command::FavoriteList { id: id.clone() })?;
                let favorite = engine
                    .repository()
                    .list(&id)
                    .map(|l| l.is_favorite())
                    .unwrap_or(false);
                println!(
                    "{}",
                    if favorite {
                        "Marked as favorite"
                    } else {
                        "Removed from favorites"
                    }
                );
            }
            ListSubcommand::Move { list, index } => {
                let id = resolve_list(engine, list)?.id().to_string();
                apply(engine, Command::ReorderList { id, index: *index })?;
                println!("Moved list to position {}", index);
            }
            ListSubcommand::ClearCompleted { list } => {
                let found = resolve_list(engine, list)?;
                let list_id = found.id().to_string();
                let before = found.todos().len();
                apply(engine, Command::ClearCompleted { list_id: list_id.clone() })?;
                let after = engine
                    .repository()
                    .list(&list_id)
                    .map(|l| l.todos().len())
                    .unwrap_or(before);
                println!("Removed {} completed todo(s)", before - after);
            }
            ListSubcommand::Show { .. } => {}
        }
        Ok(())
    }
}

fn show_all(lists: Vec<&List>, format: &OutputFormat) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&lists)?);
        }
        OutputFormat::Text => {
            if lists.is_empty() {
                println!("No lists yet. Create one with: todoosh list add <name>");
                return Ok(());
            }
            for list in lists {
                println!(
                    "{}{}  {} item(s) left  ({})",
                    list.name(),
                    if list.is_favorite() { " *" } else { "" },
                    list.active_count(),
                    list.id()
                );
            }
        }
    }
    Ok(())
}

fn show_list(list: &List, filter: Filter, format: &OutputFormat) -> Result<(), CliError> {
    let todos = list.display_todos(filter);
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&todos)?);
        }
        OutputFormat::Text => {
            println!("{}{}", list.name(), if list.is_favorite() { " *" } else { "" });
            println!("{}", "=".repeat(list.name().chars().count().max(1)));
            if todos.is_empty() {
                println!("Nothing to show ({})", filter);
            }
            for todo in todos {
                print_todo(todo, "");
            }
            println!();
            println!("{} item(s) left", list.active_count());
        }
    }
    Ok(())
}
