use clap::{Args, Subcommand};

use todoosh_core::{Command, SyncEngine};

use super::{apply, finish, open_for_update, print_todo, CliError};
use crate::config::Config;

#[derive(Args)]
pub struct SubtaskCommand {
    #[command(subcommand)]
    pub command: SubtaskSubcommand,
}

#[derive(Subcommand)]
pub enum SubtaskSubcommand {
    /// Add a subtask to a todo
    Add {
        /// Todo ID
        todo: String,

        /// Subtask text
        text: String,
    },

    /// Change a subtask's text
    Edit {
        /// Subtask ID
        id: String,

        /// New text
        text: String,
    },

    /// Mark a subtask done, or not done
    Toggle {
        /// Subtask ID
        id: String,
    },

    /// Delete a subtask
    Delete {
        /// Subtask ID
        id: String,
    },
}

impl SubtaskCommand {
    pub async fn run(&self, config: &Config) -> Result<(), CliError> {
        let mut engine = open_for_update(config).await;
        let result = self.update(&mut engine);
        finish(&mut engine).await;
        result
    }

    fn update(&self, engine: &mut SyncEngine) -> Result<(), CliError> {
        let command = match &self.command {
            SubtaskSubcommand::Add { todo, text } => Command::CreateSubtask {
                todo_id: todo.clone(),
                text: text.clone(),
            },
            SubtaskSubcommand::Edit { id, text } => Command::EditSubtask {
                id: id.clone(),
                text: text.clone(),
            },
            SubtaskSubcommand::Toggle { id } => Command::ToggleSubtask { id: id.clone() },
            SubtaskSubcommand::Delete { id } => Command::DeleteSubtask { id: id.clone() },
        };

        // Resolve the owning todo first; a deleted subtask can't be found after
        let owner = match &self.command {
            SubtaskSubcommand::Add { todo, .. } => Some(todo.clone()),
            SubtaskSubcommand::Edit { id, .. }
            | SubtaskSubcommand::Toggle { id }
            | SubtaskSubcommand::Delete { id } => engine
                .lists()
                .iter()
                .find_map(|list| list.todo_with_subtask(id))
                .map(|todo| todo.id().to_string()),
        };

        if apply(engine, command)?.is_none() {
            println!("Nothing to change");
            return Ok(());
        }
        if let Some((_, todo)) = owner.and_then(|id| engine.repository().find_todo(&id)) {
            print_todo(todo, "");
        }
        Ok(())
    }
}
