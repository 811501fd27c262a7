//! The single owned aggregate holding every list.
//!
//! All mutation goes through [`Repository::apply`], which validates input,
//! applies the change and leaves every collection densely ordered before it
//! returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::models::{List, Todo};
use crate::ordering;
use crate::validation::ValidationError;

/// Commands accepted from the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Command {
    CreateList { name: String },
    EditList { id: String, name: String },
    DeleteList { id: String },
    FavoriteList { id: String },
    ReorderList { id: String, index: usize },
    ClearCompleted { list_id: String },
    CreateTodo { list_id: String, text: String },
    EditTodo { id: String, text: String },
    ToggleTodo { id: String },
    FavoriteTodo { id: String },
    DeleteTodo { id: String },
    ReorderTodo { id: String, index: usize },
    CreateSubtask { todo_id: String, text: String },
    EditSubtask { id: String, text: String },
    ToggleSubtask { id: String },
    DeleteSubtask { id: String },
}

/// Kind of entity a change refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    List,
    Todo,
    Subtask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
    Reordered,
}

/// Fine-grained description of an applied command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub kind: ChangeKind,
    pub entity: EntityKind,
    pub id: String,
}

impl Change {
    fn new(kind: ChangeKind, entity: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            entity,
            id: id.into(),
        }
    }
}

/// Errors surfaced synchronously to the caller of [`Repository::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("{entity:?} not found: {id}")]
    NotFound { entity: EntityKind, id: String },
}

impl CommandError {
    fn not_found(entity: EntityKind, id: &str) -> Self {
        CommandError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Every list, in stored order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Repository {
    lists: Vec<List>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a repository from already-validated lists, renumbering them.
    pub fn from_lists(mut lists: Vec<List>) -> Self {
        ordering::normalize(&mut lists);
        Self { lists }
    }

    /// Lists in stored order.
    pub fn lists(&self) -> &[List] {
        &self.lists
    }

    /// Lists for display: favorites first, then by `order`.
    pub fn display_lists(&self) -> Vec<&List> {
        ordering::favorites_first(&self.lists)
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn list(&self, id: &str) -> Option<&List> {
        self.lists.iter().find(|l| l.id() == id)
    }

    /// Finds a todo and the list that owns it.
    pub fn find_todo(&self, id: &str) -> Option<(&List, &Todo)> {
        self.lists
            .iter()
            .find_map(|list| list.todo(id).map(|todo| (list, todo)))
    }

    /// Replaces the whole collection (used when adopting a remote snapshot).
    pub fn replace(&mut self, lists: Vec<List>) {
        self.lists = lists;
        ordering::normalize(&mut self.lists);
    }

    /// The persisted form of the collection, used for no-op detection.
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(&self.lists).unwrap_or_else(|e| {
            warn!("Failed to serialize collection: {}", e);
            Value::Null
        })
    }

    /// Applies a command.
    ///
    /// Returns `Ok(None)` when the command was accepted but changed nothing
    /// (for example an edit with blank text).
    pub fn apply(&mut self, command: Command) -> Result<Option<Change>, CommandError> {
        use ChangeKind::*;
        use EntityKind::{List as ListEntity, Subtask as SubtaskEntity, Todo as TodoEntity};

        let change = match command {
            Command::CreateList { name } => {
                let list = List::new(&name, self.lists.len() as u32)?;
                let id = list.id().to_string();
                ordering::append(&mut self.lists, list);
                Some(Change::new(Created, ListEntity, id))
            }
            Command::EditList { id, name } => {
                let list = self.list_mut(&id)?;
                list.rename(&name)?
                    .then(|| Change::new(Updated, ListEntity, id))
            }
            Command::DeleteList { id } => {
                ordering::remove(&mut self.lists, &id)
                    .ok_or_else(|| CommandError::not_found(ListEntity, &id))?;
                Some(Change::new(Deleted, ListEntity, id))
            }
            Command::FavoriteList { id } => {
                self.list_mut(&id)?.toggle_favorite();
                Some(Change::new(Updated, ListEntity, id))
            }
            Command::ReorderList { id, index } => {
                if !ordering::reorder(&mut self.lists, &id, index) {
                    return Err(CommandError::not_found(ListEntity, &id));
                }
                Some(Change::new(Reordered, ListEntity, id))
            }
            Command::ClearCompleted { list_id } => {
                let list = self.list_mut(&list_id)?;
                (list.clear_completed() > 0).then(|| Change::new(Updated, ListEntity, list_id))
            }
            Command::CreateTodo { list_id, text } => {
                let list = self.list_mut(&list_id)?;
                let id = list.add_todo(&text)?.id().to_string();
                Some(Change::new(Created, TodoEntity, id))
            }
            Command::EditTodo { id, text } => {
                let list = self.owner_mut(EntityKind::Todo, &id, |l| l.todo(&id).is_some())?;
                let edited = match list.todo_mut(&id) {
                    Some(todo) => todo.edit(&text)?,
                    None => false,
                };
                if edited {
                    list.touch();
                }
                edited.then(|| Change::new(Updated, TodoEntity, id))
            }
            Command::ToggleTodo { id } => {
                let list = self.owner_mut(EntityKind::Todo, &id, |l| l.todo(&id).is_some())?;
                if let Some(todo) = list.todo_mut(&id) {
                    todo.toggle_completed();
                }
                list.touch();
                Some(Change::new(Updated, TodoEntity, id))
            }
            Command::FavoriteTodo { id } => {
                let list = self.owner_mut(EntityKind::Todo, &id, |l| l.todo(&id).is_some())?;
                if let Some(todo) = list.todo_mut(&id) {
                    todo.toggle_favorite();
                }
                list.touch();
                Some(Change::new(Updated, TodoEntity, id))
            }
            Command::DeleteTodo { id } => {
                let list = self.owner_mut(EntityKind::Todo, &id, |l| l.todo(&id).is_some())?;
                list.remove_todo(&id);
                Some(Change::new(Deleted, TodoEntity, id))
            }
            Command::ReorderTodo { id, index } => {
                let list = self.owner_mut(EntityKind::Todo, &id, |l| l.todo(&id).is_some())?;
                list.reorder_todo(&id, index);
                Some(Change::new(Reordered, TodoEntity, id))
            }
            Command::CreateSubtask { todo_id, text } => {
                let list = self.owner_mut(EntityKind::Todo, &todo_id, |l| {
                    l.todo(&todo_id).is_some()
                })?;
                let created = match list.todo_mut(&todo_id) {
                    Some(todo) => Some(todo.add_subtask(&text)?.id().to_string()),
                    None => None,
                };
                list.touch();
                created.map(|id| Change::new(Created, SubtaskEntity, id))
            }
            Command::EditSubtask { id, text } => {
                let list = self.owner_mut(EntityKind::Subtask, &id, |l| {
                    l.todo_with_subtask(&id).is_some()
                })?;
                let mut edited = false;
                if let Some(todo) = list.todo_with_subtask_mut(&id) {
                    if let Some(subtask) = todo.subtask_mut(&id) {
                        edited = subtask.edit(&text)?;
                    }
                    if edited {
                        todo.touch();
                    }
                }
                if edited {
                    list.touch();
                }
                edited.then(|| Change::new(Updated, SubtaskEntity, id))
            }
            Command::ToggleSubtask { id } => {
                let list = self.owner_mut(EntityKind::Subtask, &id, |l| {
                    l.todo_with_subtask(&id).is_some()
                })?;
                if let Some(todo) = list.todo_with_subtask_mut(&id) {
                    if let Some(subtask) = todo.subtask_mut(&id) {
                        subtask.toggle();
                    }
                    todo.touch();
                }
                list.touch();
                Some(Change::new(Updated, SubtaskEntity, id))
            }
            Command::DeleteSubtask { id } => {
                let list = self.owner_mut(EntityKind::Subtask, &id, |l| {
                    l.todo_with_subtask(&id).is_some()
                })?;
                if let Some(todo) = list.todo_with_subtask_mut(&id) {
                    todo.remove_subtask(&id);
                }
                list.touch();
                Some(Change::new(Deleted, SubtaskEntity, id))
            }
        };

        debug_assert!(ordering::is_dense(&self.lists));
        Ok(change)
    }

    fn list_mut(&mut self, id: &str) -> Result<&mut List, CommandError> {
        self.owner_mut(EntityKind::List, id, |l| l.id() == id)
    }

    /// The first list matching `contains`, or a not-found error for `id`.
    fn owner_mut(
        &mut self,
        entity: EntityKind,
        id: &str,
        contains: impl Fn(&List) -> bool,
    ) -> Result<&mut List, CommandError> {
        self.lists
            .iter_mut()
            .find(|list| contains(list))
            .ok_or_else(|| CommandError::not_found(entity, id))
    }
}
