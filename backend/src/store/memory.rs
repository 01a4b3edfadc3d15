use std::collections::HashMap;

use async_trait::async_trait;
use bson::oid::ObjectId;
use shared::{CreateTodo, Todo, UpdateTodo};
use tokio::sync::RwLock;

use super::{now, Result, TodoStore};

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    todos: RwLock<HashMap<ObjectId, Todo>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TodoStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Todo>> {
        let todos = self.todos.read().await;
        Ok(todos.values().cloned().collect())
    }

    async fn insert(&self, input: CreateTodo) -> Result<String> {
        let id = ObjectId::new();
        let todo = Todo::new(id.to_hex(), input, now());
        self.todos.write().await.insert(id, todo);
        Ok(id.to_hex())
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<Todo>> {
        Ok(self.todos.read().await.get(&id).cloned())
    }

    async fn update_by_id(&self, id: ObjectId, changes: UpdateTodo) -> Result<Option<Todo>> {
        let mut todos = self.todos.write().await;
        Ok(todos.get_mut(&id).map(|todo| {
            todo.apply(changes, now());
            todo.clone()
        }))
    }

    async fn delete_by_id(&self, id: ObjectId) -> Result<bool> {
        Ok(self.todos.write().await.remove(&id).is_some())
    }
}
