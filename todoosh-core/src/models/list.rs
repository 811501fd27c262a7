use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::{Filter, Todo};
use crate::ordering::{self, Ordered};
use crate::validation::{self, ValidationError, MAX_NAME_LENGTH};

/// A named, ordered container of todos.
///
/// The list exclusively owns its todos; dropping the list drops them and
/// their subtasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct List {
    id: String,
    name: String,
    todos: Vec<Todo>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    order: u32,
    favorite: bool,
    is_archived: bool,
}

impl List {
    pub fn new(name: &str, order: u32) -> Result<Self, ValidationError> {
        let name = validation::clean_text("name", name, MAX_NAME_LENGTH)?;
        let now = Utc::now();
        Ok(Self {
            id: super::new_id(),
            name,
            todos: Vec::new(),
            created_at: now,
            updated_at: now,
            order,
            favorite: false,
            is_archived: false,
        })
    }

    /// Reads a list from a persisted or remote payload.
    ///
    /// A todo that fails validation (or repeats an id) is dropped on its own;
    /// the remaining todos are renumbered densely.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let obj = validation::as_object(value)?;
        let id = validation::required_id(obj, "id")?;
        let name = validation::required_text(obj, "name", MAX_NAME_LENGTH)?;
        let created_at = validation::required_timestamp(obj, "createdAt")?;
        let order = validation::required_order(obj, "order")?;

        let mut seen = HashSet::new();
        let mut todos = Vec::new();
        for raw in validation::optional_array(obj, "todos")? {
            match Todo::from_value(raw) {
                Ok(todo) if seen.insert(todo.id().to_string()) => todos.push(todo),
                Ok(todo) => warn!(list = %id, todo = %todo.id(), "Dropping duplicate todo"),
                Err(e) => warn!(list = %id, "Dropping invalid todo: {}", e),
            }
        }
        ordering::normalize(&mut todos);

        Ok(Self {
            name,
            todos,
            created_at,
            updated_at: validation::optional_timestamp(obj, "updatedAt")?.unwrap_or(created_at),
            order,
            favorite: validation::optional_bool(obj, "favorite")?,
            is_archived: validation::optional_bool(obj, "isArchived")?,
            id,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Todos in stored order.
    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn is_favorite(&self) -> bool {
        self.favorite
    }

    pub fn is_archived(&self) -> bool {
        self.is_archived
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Renames the list. Blank input is ignored and reported as `Ok(false)`.
    pub fn rename(&mut self, name: &str) -> Result<bool, ValidationError> {
        if name.trim().is_empty() {
            return Ok(false);
        }
        self.name = validation::clean_text("name", name, MAX_NAME_LENGTH)?;
        self.touch();
        Ok(true)
    }

    pub fn toggle_favorite(&mut self) -> bool {
        self.favorite = !self.favorite;
        self.touch();
        self.favorite
    }

    /// Creates a todo at the end of the list.
    pub fn add_todo(&mut self, text: &str) -> Result<&Todo, ValidationError> {
        let todo = Todo::new(text, self.todos.len() as u32)?;
        ordering::append(&mut self.todos, todo);
        self.touch();
        Ok(&self.todos[self.todos.len() - 1])
    }

    pub fn todo(&self, id: &str) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id() == id)
    }

    pub(crate) fn todo_mut(&mut self, id: &str) -> Option<&mut Todo> {
        self.todos.iter_mut().find(|t| t.id() == id)
    }

    /// The todo that owns the given subtask.
    pub fn todo_with_subtask(&self, subtask_id: &str) -> Option<&Todo> {
        self.todos.iter().find(|t| t.subtask(subtask_id).is_some())
    }

    pub(crate) fn todo_with_subtask_mut(&mut self, subtask_id: &str) -> Option<&mut Todo> {
        self.todos
            .iter_mut()
            .find(|t| t.subtask(subtask_id).is_some())
    }

    /// Removes a todo (and its subtasks), closing the gap in `order`.
    pub fn remove_todo(&mut self, id: &str) -> Option<Todo> {
        let removed = ordering::remove(&mut self.todos, id)?;
        self.touch();
        Some(removed)
    }

    /// Moves a todo to `index`; returns `false` for an unknown id.
    pub fn reorder_todo(&mut self, id: &str, index: usize) -> bool {
        let moved = ordering::reorder(&mut self.todos, id, index);
        if moved {
            self.touch();
        }
        moved
    }

    /// Removes every completed todo; returns how many were removed.
    pub fn clear_completed(&mut self) -> usize {
        let removed = ordering::remove_where(&mut self.todos, |t| t.is_completed());
        if removed > 0 {
            self.touch();
        }
        removed
    }

    /// Todos for display: filtered, favorites first, then by `order`.
    pub fn display_todos(&self, filter: Filter) -> Vec<&Todo> {
        ordering::favorites_first(&self.todos)
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect()
    }

    /// Number of todos not yet completed.
    pub fn active_count(&self) -> usize {
        self.todos.iter().filter(|t| !t.is_completed()).count()
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Ordered for List {
    fn id(&self) -> &str {
        &self.id
    }

    fn order(&self) -> u32 {
        self.order
    }

    fn set_order(&mut self, order: u32) {
        self.order = order;
    }

    fn is_favorite(&self) -> bool {
        self.favorite
    }
}
