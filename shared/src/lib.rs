use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// A todo as it appears on the wire. `id` is the hex rendering of the
/// store's object id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Body of `POST /todos`. A missing title decodes as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTodo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
}

/// Body of `PATCH /todos/:id`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTodo {
    pub title: Option<String>,
    pub completed: Option<bool>,
    pub due: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedTodo {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoList {
    pub items: Vec<Todo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub ok: bool,
}

impl Todo {
    /// Builds a fresh, not yet completed todo stamped with `now`.
    pub fn new(id: String, input: CreateTodo, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: input.title,
            completed: false,
            due: input.due.map(to_millis),
            created: now,
            updated: now,
        }
    }

    /// Applies a partial update and refreshes `updated`.
    pub fn apply(&mut self, changes: UpdateTodo, now: DateTime<Utc>) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(completed) = changes.completed {
            self.completed = completed;
        }
        if let Some(due) = changes.due {
            self.due = Some(to_millis(due));
        }
        self.updated = now;
    }
}

/// Timestamps are kept at millisecond precision, the finest a BSON
/// datetime holds, so every store returns exactly what it was given.
fn to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}
