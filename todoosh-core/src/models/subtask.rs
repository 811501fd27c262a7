use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validation::{self, ValidationError, MAX_TEXT_LENGTH};

/// A child task owned by exactly one [`Todo`](super::Todo).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    id: String,
    text: String,
    completed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Subtask {
    pub fn new(text: &str) -> Result<Self, ValidationError> {
        let text = validation::clean_text("text", text, MAX_TEXT_LENGTH)?;
        let now = Utc::now();
        Ok(Self {
            id: super::new_id(),
            text,
            completed: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Reads a subtask from a persisted or remote payload.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let obj = validation::as_object(value)?;
        let created_at = validation::required_timestamp(obj, "createdAt")?;
        Ok(Self {
            id: validation::required_id(obj, "id")?,
            text: validation::required_text(obj, "text", MAX_TEXT_LENGTH)?,
            completed: validation::required_bool(obj, "completed")?,
            created_at,
            updated_at: validation::optional_timestamp(obj, "updatedAt")?.unwrap_or(created_at),
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

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replaces the text. Blank input is ignored and reported as `Ok(false)`.
    pub fn edit(&mut self, text: &str) -> Result<bool, ValidationError> {
        if text.trim().is_empty() {
            return Ok(false);
        }
        self.text = validation::clean_text("text", text, MAX_TEXT_LENGTH)?;
        self.updated_at = Utc::now();
        Ok(true)
    }

    pub fn toggle(&mut self) -> bool {
        self.completed = !self.completed;
        self.updated_at = Utc::now();
        self.completed
    }

    pub(crate) fn complete(&mut self) {
        if !self.completed {
            self.completed = true;
            self.updated_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subtask_new() {
        let subtask = Subtask::new("  chop onions ").unwrap();
        assert_eq!(subtask.text(), "chop onions");
        assert!(!subtask.is_completed());
        assert_eq!(subtask.created_at(), subtask.updated_at());
    }

    #[test]
    fn test_subtask_new_rejects_blank() {
        assert!(Subtask::new(" ").is_err());
    }

    #[test]
    fn test_subtask_edit_blank_is_noop() {
        let mut subtask = Subtask::new("a").unwrap();
        assert!(!subtask.edit("   ").unwrap());
        assert_eq!(subtask.text(), "a");
        assert!(subtask.edit("b").unwrap());
        assert_eq!(subtask.text(), "b");
    }

    #[test]
    fn test_subtask_from_value_defaults_updated_at() {
        let value = json!({
            "id": "s1",
            "text": "step",
            "completed": true,
            "createdAt": "2024-01-01T00:00:00Z"
        });
        let subtask = Subtask::from_value(&value).unwrap();
        assert!(subtask.is_completed());
        assert_eq!(subtask.updated_at(), subtask.created_at());
    }

    #[test]
    fn test_subtask_from_value_requires_completed() {
        let value = json!({"id": "s1", "text": "step", "createdAt": "2024-01-01T00:00:00Z"});
        assert_eq!(
            Subtask::from_value(&value),
            Err(ValidationError::MissingField("completed"))
        );
    }
}
