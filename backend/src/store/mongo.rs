use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{options::ReturnDocument, Client, Collection, Database};
use serde::{Deserialize, Serialize};
use shared::{CreateTodo, Todo, UpdateTodo};

use super::{now, Result, StoreError, TodoStore};

/// Storage shape of a todo. The primary key is the native `ObjectId`; the
/// wire shape carries its hex rendering instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoDocument {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub due: Option<bson::DateTime>,
    #[serde(default = "zero_time")]
    pub created: bson::DateTime,
    #[serde(default = "zero_time")]
    pub updated: bson::DateTime,
}

/// `0001-01-01T00:00:00Z`, read in place of timestamps missing from older
/// title-only documents.
fn zero_time() -> bson::DateTime {
    bson::DateTime::from_millis(-62_135_596_800_000)
}

impl From<TodoDocument> for Todo {
    fn from(document: TodoDocument) -> Self {
        Self {
            id: document.id.to_hex(),
            title: document.title,
            completed: document.completed,
            due: document.due.map(bson::DateTime::to_chrono),
            created: document.created.to_chrono(),
            updated: document.updated.to_chrono(),
        }
    }
}

impl TryFrom<Todo> for TodoDocument {
    type Error = bson::oid::Error;

    fn try_from(todo: Todo) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            id: ObjectId::parse_str(&todo.id)?,
            title: todo.title,
            completed: todo.completed,
            due: todo.due.map(bson::DateTime::from_chrono),
            created: bson::DateTime::from_chrono(todo.created),
            updated: bson::DateTime::from_chrono(todo.updated),
        })
    }
}

/// MongoDB backend. The driver pools connections internally, so one
/// instance is shared by every request.
#[derive(Clone)]
pub struct MongoStore {
    database: Database,
    todos: Collection<Document>,
}

impl MongoStore {
    pub async fn connect(url: &str, database: &str, collection: &str) -> Result<Self> {
        let client = Client::with_uri_str(url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let database = client.database(database);
        let todos = database.collection::<Document>(collection);
        Ok(Self { database, todos })
    }
}

/// Full document for a new todo. The driver adds `_id`.
fn new_document(input: CreateTodo, now: DateTime<Utc>) -> Document {
    let stamp = bson::DateTime::from_chrono(now);
    doc! {
        "title": input.title,
        "completed": false,
        "due": input.due.map(bson::DateTime::from_chrono),
        "created": stamp,
        "updated": stamp,
    }
}

/// `$set` body for a partial update; always refreshes `updated`.
fn update_document(changes: UpdateTodo, now: DateTime<Utc>) -> Document {
    let mut set = doc! { "updated": bson::DateTime::from_chrono(now) };
    if let Some(title) = changes.title {
        set.insert("title", title);
    }
    if let Some(completed) = changes.completed {
        set.insert("completed", completed);
    }
    if let Some(due) = changes.due {
        set.insert("due", bson::DateTime::from_chrono(due));
    }
    doc! { "$set": set }
}

fn decode(document: Document) -> Result<Todo> {
    bson::from_document::<TodoDocument>(document)
        .map(Todo::from)
        .map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait]
impl TodoStore for MongoStore {
    async fn ping(&self) -> Result<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Todo>> {
        // The cursor is killed server-side when dropped, which covers the
        // early returns below as well as a cancelled request.
        let mut cursor = self
            .todos
            .find(doc! {})
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut items = Vec::new();
        while let Some(document) = cursor
            .try_next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            items.push(decode(document)?);
        }
        Ok(items)
    }

    async fn insert(&self, input: CreateTodo) -> Result<String> {
        let result = self
            .todos
            .insert_one(new_document(input, now()))
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;

        match result.inserted_id {
            Bson::ObjectId(oid) => Ok(oid.to_hex()),
            Bson::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }

    async fn find_by_id(&self, id: ObjectId) -> Result<Option<Todo>> {
        self.todos
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
            .map(decode)
            .transpose()
    }

    async fn update_by_id(&self, id: ObjectId, changes: UpdateTodo) -> Result<Option<Todo>> {
        self.todos
            .find_one_and_update(doc! { "_id": id }, update_document(changes, now()))
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?
            .map(decode)
            .transpose()
    }

    async fn delete_by_id(&self, id: ObjectId) -> Result<bool> {
        let result = self
            .todos
            .delete_one(doc! { "_id": id })
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(result.deleted_count > 0)
    }
}
