use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use super::Subtask;
use crate::ordering::Ordered;
use crate::validation::{self, ValidationError, MAX_TEXT_LENGTH};

/// A task entry belonging to exactly one [`List`](super::List).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    id: String,
    text: String,
    completed: bool,
    favorite: bool,
    order: u32,
    subtasks: Vec<Subtask>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    tags: BTreeSet<String>,
}

impl Todo {
    pub fn new(text: &str, order: u32) -> Result<Self, ValidationError> {
        let text = validation::clean_text("text", text, MAX_TEXT_LENGTH)?;
        let now = Utc::now();
        Ok(Self {
            id: super::new_id(),
            text,
            completed: false,
            favorite: false,
            order,
            subtasks: Vec::new(),
            created_at: now,
            updated_at: now,
            tags: BTreeSet::new(),
        })
    }

    /// Reads a todo from a persisted or remote payload.
    ///
    /// Invalid subtasks are dropped individually; a subtask whose id repeats
    /// an earlier one is dropped as well.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let obj = validation::as_object(value)?;
        let id = validation::required_id(obj, "id")?;
        let created_at = validation::required_timestamp(obj, "createdAt")?;

        let mut seen = HashSet::new();
        let mut subtasks = Vec::new();
        for raw in validation::optional_array(obj, "subtasks")? {
            match Subtask::from_value(raw) {
                Ok(subtask) if seen.insert(subtask.id().to_string()) => subtasks.push(subtask),
                Ok(subtask) => {
                    warn!(todo = %id, subtask = %subtask.id(), "Dropping duplicate subtask");
                }
                Err(e) => warn!(todo = %id, "Dropping invalid subtask: {}", e),
            }
        }

        let tags = validation::optional_array(obj, "tags")?
            .iter()
            .filter_map(|tag| tag.as_str().map(str::to_string))
            .collect();

        Ok(Self {
            text: validation::required_text(obj, "text", MAX_TEXT_LENGTH)?,
            completed: validation::required_bool(obj, "completed")?,
            favorite: validation::optional_bool(obj, "favorite")?,
            order: validation::required_order(obj, "order")?,
            subtasks,
            created_at,
            updated_at: validation::optional_timestamp(obj, "updatedAt")?.unwrap_or(created_at),
            tags,
            id,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_favorite(&self) -> bool {
        self.favorite
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn subtasks(&self) -> &[Subtask] {
        &self.subtasks
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    #[cfg(test)]
    pub(crate) fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the text. Blank input is ignored and reported as `Ok(false)`.
    pub fn edit(&mut self, text: &str) -> Result<bool, ValidationError> {
        if text.trim().is_empty() {
            return Ok(false);
        }
        self.text = validation::clean_text("text", text, MAX_TEXT_LENGTH)?;
        self.touch();
        Ok(true)
    }

    /// Flips completion. Completing cascades to every subtask; reopening
    /// leaves subtasks as they are.
    pub fn toggle_completed(&mut self) -> bool {
        self.completed = !self.completed;
        if self.completed {
            for subtask in &mut self.subtasks {
                subtask.complete();
            }
        }
        self.touch();
        self.completed
    }

    pub fn toggle_favorite(&mut self) -> bool {
        self.favorite = !self.favorite;
        self.touch();
        self.favorite
    }

    pub fn add_subtask(&mut self, text: &str) -> Result<&Subtask, ValidationError> {
        let subtask = Subtask::new(text)?;
        self.subtasks.push(subtask);
        self.touch();
        Ok(&self.subtasks[self.subtasks.len() - 1])
    }

    pub fn subtask(&self, id: &str) -> Option<&Subtask> {
        self.subtasks.iter().find(|s| s.id() == id)
    }

    pub(crate) fn subtask_mut(&mut self, id: &str) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id() == id)
    }

    pub fn remove_subtask(&mut self, id: &str) -> Option<Subtask> {
        let position = self.subtasks.iter().position(|s| s.id() == id)?;
        self.touch();
        Some(self.subtasks.remove(position))
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Ordered for Todo {
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
