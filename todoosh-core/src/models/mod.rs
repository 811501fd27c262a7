mod list;
mod subtask;
mod todo;

pub use list::List;
pub use subtask::Subtask;
pub use todo::Todo;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Assigns a fresh entity id.
pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Which todos of a list to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    #[default]
    All,
    Active,
    Completed,
}

impl Filter {
    pub fn matches(&self, todo: &Todo) -> bool {
        match self {
            Filter::All => true,
            Filter::Active => !todo.is_completed(),
            Filter::Completed => todo.is_completed(),
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::All => write!(f, "all"),
            Filter::Active => write!(f, "active"),
            Filter::Completed => write!(f, "completed"),
        }
    }
}
