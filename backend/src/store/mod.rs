//! Persistence gateway.
//!
//! Handlers only see [`TodoStore`]. The concrete backend is picked from the
//! scheme of the database URL when the process starts:
//!
//! | scheme | backend |
//! |---|---|
//! | `mongodb://`, `mongodb+srv://` | [`MongoStore`] |
//! | `redis://`, `rediss://` | [`RedisStore`] |
//! | `memory://` | [`MemoryStore`] |

use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::{DateTime, SubsecRound, Utc};
use shared::{CreateTodo, Todo, UpdateTodo};
use thiserror::Error;
use tracing::info;

use crate::config::Config;

mod memory;
mod mongo;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::mongo::{MongoStore, TodoDocument};
pub use self::redis_store::RedisStore;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("malformed document: {0}")]
    Decode(String),
    #[error("write failed: {0}")]
    Write(String),
    #[error("unsupported database url: {0}")]
    UnsupportedUrl(String),
}

#[async_trait]
pub trait TodoStore: Send + Sync + 'static {
    /// Round-trips to the store.
    async fn ping(&self) -> Result<()>;

    /// Every stored todo, in no particular order.
    async fn list_all(&self) -> Result<Vec<Todo>>;

    /// Stores a new todo and returns its generated hex id.
    async fn insert(&self, input: CreateTodo) -> Result<String>;

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<Todo>>;

    /// Applies a partial update. `None` when no todo has this id.
    async fn update_by_id(&self, id: ObjectId, changes: UpdateTodo) -> Result<Option<Todo>>;

    /// `false` when no todo has this id.
    async fn delete_by_id(&self, id: ObjectId) -> Result<bool>;
}

/// Opens the backend named by `config.database_url` and checks that it
/// answers. Called once at startup.
pub async fn connect(config: &Config) -> Result<Arc<dyn TodoStore>> {
    let url = config.database_url.as_str();
    let store: Arc<dyn TodoStore> = match scheme(url) {
        Some("mongodb" | "mongodb+srv") => Arc::new(
            MongoStore::connect(url, &config.database_name, &config.collection).await?,
        ),
        Some("redis" | "rediss") => Arc::new(RedisStore::connect(url, &config.collection).await?),
        Some("memory") => Arc::new(MemoryStore::new()),
        _ => return Err(StoreError::UnsupportedUrl(url.to_string())),
    };

    store.ping().await?;
    info!(
        backend = scheme(url).unwrap_or_default(),
        database = %config.database_name,
        collection = %config.collection,
        "connected to store"
    );
    Ok(store)
}

fn scheme(url: &str) -> Option<&str> {
    url.split_once("://").map(|(scheme, _)| scheme)
}

/// Current time at the precision BSON datetimes can hold, so every backend
/// hands back exactly what it stored.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
