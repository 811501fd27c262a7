use clap::{Args, Subcommand};

use todoosh_core::{Command, SyncEngine};

use super::{
    apply, finish, open_engine, open_for_update, print_todo, resolve_list, CliError, OutputFormat,
};
use crate::config::Config;

#[derive(Args)]
pub struct TodoCommand {
    #[command(subcommand)]
    pub command: TodoSubcommand,
}

#[derive(Subcommand)]
pub enum TodoSubcommand {
    /// Add a todo to the end of a list
    Add {
        /// List ID or name
        list: String,

        /// Todo text
        text: String,
    },

    /// Change a todo's text
    Edit {
        /// Todo ID
        id: String,

        /// New text
        text: String,
    },

    /// Mark a todo done, or not done (subtasks follow when completing)
    Toggle {
        /// Todo ID
        id: String,
    },

    /// Toggle a todo's favorite flag
    Favorite {
        /// Todo ID
        id: String,
    },

    /// Delete a todo
    Delete {
        /// Todo ID
        id: String,
    },

    /// Move a todo to a new position within its list (0-based)
    Move {
        /// Todo ID
        id: String,

        /// Target position
        index: usize,
    },

    /// Show a todo's details
    Show {
        /// Todo ID
        id: String,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl TodoCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CliError> {
        if let TodoSubcommand::Show { id, format } = &self.command {
            let engine = open_engine(config, false).await;
            return show(&engine, id, format);
        }

        let mut engine = open_for_update(config).await;
        let result = self.update(&mut engine);
        finish(&mut engine).await;
        result
    }

    fn update(&self, engine: &mut SyncEngine) -> Result<(), CliError> {
        match &self.command {
            TodoSubcommand::Add { list, text } => {
                let list_id = resolve_list(engine, list)?.id().to_string();
                let command = Command::CreateTodo {
                    list_id,
                    text: text.clone(),
                };
                if let Some(change) = apply(engine, command)? {
                    println!("Created todo {}", change.id);
                }
            }
            TodoSubcommand::Edit { id, text } => {
                let command = Command::EditTodo {
                    id: id.clone(),
                    text: text.clone(),
                };
                match apply(engine, command)? {
                    Some(_) => println!("Updated todo"),
                    None => println!("Nothing to change"),
                }
            }
            TodoSubcommand::Toggle { id } => {
                apply(engine, Command::ToggleTodo { id: id.clone() })?;
                if let Some((_, todo)) = engine.repository().find_todo(id) {
                    print_todo(todo, "");
                }
            }
            TodoSubcommand::Favorite { id } => {
                apply(engine, Command::FavoriteTodo { id: id.clone() })?;
                if let Some((_, todo)) = engine.repository().find_todo(id) {
                    print_todo(todo, "");
                }
            }
            TodoSubcommand::Delete { id } => {
                apply(engine, Command::DeleteTodo { id: id.clone() })?;
                println!("Deleted todo {}", id);
            }
            TodoSubcommand::Move { id, index } => {
                let command = Command::ReorderTodo {
                    id: id.clone(),
                    index: *index,
                };
                apply(engine, command)?;
                println!("Moved todo to position {}", index);
            }
            TodoSubcommand::Show { .. } => {}
        }
        Ok(())
    }
}

fn show(engine: &SyncEngine, id: &str, format: &OutputFormat) -> Result<(), CliError> {
    let (list, todo) = engine
        .repository()
        .find_todo(id)
        .ok_or_else(|| CliError::TodoNotFound(id.to_string()))?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(todo)?);
        }
        OutputFormat::Text => {
            print_todo(todo, "");
            println!();
            println!("List:     {}", list.name());
            println!("Position: {}", todo.order());
            if !todo.tags().is_empty() {
                let tags: Vec<&str> = todo.tags().iter().map(String::as_str).collect();
                println!("Tags:     {}", tags.join(", "));
            }
            println!("Created:  {}", todo.created_at().format("%Y-%m-%d %H:%M"));
            println!("Updated:  {}", todo.updated_at().format("%Y-%m-%d %H:%M"));
        }
    }
    Ok(())
}
