//! In-memory todo collection
//!
//! Process-local and seeded at startup; not shared across instances.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A todo item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    /// Server-assigned identifier
    pub id: u64,
    /// What needs doing
    pub description: String,
    /// Whether it is done
    pub completed: bool,
}

/// Request body for creating a todo
#[derive(Debug, Clone, Deserialize)]
pub struct NewTodo {
    /// Required, at least one character
    pub description: String,
    /// Defaults to `false`
    #[serde(default)]
    pub completed: bool,
}

/// Request body for updating a todo; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TodoPatch {
    /// New description
    pub description: Option<String>,
    /// New status
    pub completed: Option<bool>,
}

fn validate_description(description: &str) -> Result<()> {
    if description.is_empty() {
        return Err(Error::Validation(
            "'description' must be at least 1 character long".to_string(),
        ));
    }
    Ok(())
}

impl NewTodo {
    /// Parse and validate a create request body
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for malformed JSON, a missing
    /// `description`, or an empty one.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let todo: Self =
            serde_json::from_slice(body).map_err(|e| Error::Validation(e.to_string()))?;
        validate_description(&todo.description)?;
        Ok(todo)
    }
}

impl TodoPatch {
    /// Parse and validate an update request body
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for malformed JSON or an empty `description`.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let patch: Self =
            serde_json::from_slice(body).map_err(|e| Error::Validation(e.to_string()))?;
        if let Some(ref description) = patch.description {
            validate_description(description)?;
        }
        Ok(patch)
    }
}

fn not_found(id: u64) -> Error {
    Error::NotFound(format!("Todo item with ID [{id}] not found"))
}

/// Thread-safe todo collection ordered by insertion
pub struct TodoStore {
    todos: RwLock<Vec<Todo>>,
}

impl TodoStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            todos: RwLock::new(Vec::new()),
        }
    }

    /// Create a store holding the two starter items
    #[must_use]
    pub fn seeded() -> Self {
        Self {
            todos: RwLock::new(vec![
                Todo {
                    id: 1,
                    description: "Remember the milk".to_string(),
                    completed: false,
                },
                Todo {
                    id: 2,
                    description: "Change my breakpads".to_string(),
                    completed: true,
                },
            ]),
        }
    }

    /// Get a todo by id
    pub fn get(&self, id: u64) -> Result<Todo> {
        self.todos
            .read()
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// List todos, optionally only those with the given status
    pub fn list(&self, completed: Option<bool>) -> Vec<Todo> {
        self.todos
            .read()
            .iter()
            .filter(|t| completed.is_none_or(|c| t.completed == c))
            .cloned()
            .collect()
    }

    /// Number of todos held
    pub fn len(&self) -> usize {
        self.todos.read().len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.todos.read().is_empty()
    }

    /// Add a todo, assigning the next id
    pub fn create(&self, new: NewTodo) -> Todo {
        let mut todos = self.todos.write();
        let id = todos.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        let todo = Todo {
            id,
            description: new.description,
            completed: new.completed,
        };
        todos.push(todo.clone());
        todo
    }

    /// Apply `patch` to the todo with `id`
    pub fn update(&self, id: u64, patch: TodoPatch) -> Result<Todo> {
        let mut todos = self.todos.write();
        let todo = todos
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| not_found(id))?;

        if let Some(description) = patch.description {
            todo.description = description;
        }
        if let Some(completed) = patch.completed {
            todo.completed = completed;
        }
        Ok(todo.clone())
    }

    /// Remove the todo with `id`
    pub fn delete(&self, id: u64) -> Result<()> {
        let mut todos = self.todos.write();
        let index = todos
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| not_found(id))?;
        todos.remove(index);
        Ok(())
    }
}

impl Default for TodoStore {
    fn default() -> Self {
        Self::seeded()
    }
}
