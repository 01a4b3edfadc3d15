use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{any, get},
    Router,
};
use bson::oid::ObjectId;
use serde::de::DeserializeOwned;
use shared::{CreateTodo, CreatedTodo, Status, Todo, TodoList, UpdateTodo};
use tracing::info;

use crate::error::ApiError;
use crate::store::TodoStore;

/// Everything a handler needs. Built once at startup and cloned into each
/// request; the store handle is the only shared resource.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TodoStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn TodoStore>) -> Self {
        Self { store }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/status", any(status))
        .route(
            "/todos",
            get(list_todos)
                .post(create_todo)
                .patch(patch_todos)
                .delete(delete_todos),
        )
        .route(
            "/todos/:id",
            get(get_todo).patch(update_todo).delete(delete_todo),
        )
        .with_state(state)
}

// Does not touch the store.
async fn status() -> Json<Status> {
    Json(Status { ok: true })
}

async fn list_todos(State(state): State<AppState>) -> Result<Json<TodoList>, ApiError> {
    let items = state.store.list_all().await?;
    Ok(Json(TodoList { items }))
}

#[tracing::instrument(skip_all)]
async fn create_todo(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CreatedTodo>, ApiError> {
    let input: CreateTodo = decode_body(&body)?;
    let id = state.store.insert(input).await?;
    info!(%id, "todo created");
    Ok(Json(CreatedTodo { id }))
}

// Collection-wide PATCH and DELETE are accepted and do nothing; item
// changes go through `/todos/:id`.
async fn patch_todos() -> StatusCode {
    StatusCode::OK
}

async fn delete_todos() -> StatusCode {
    StatusCode::OK
}

async fn get_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Todo>, ApiError> {
    let oid = parse_id(&id)?;
    state
        .store
        .find_by_id(oid)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

#[tracing::instrument(skip(state, body))]
async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Todo>, ApiError> {
    let oid = parse_id(&id)?;
    let changes: UpdateTodo = decode_body(&body)?;
    let todo = state
        .store
        .update_by_id(oid, changes)
        .await?
        .ok_or(ApiError::NotFound(id))?;
    info!("todo updated");
    Ok(Json(todo))
}

#[tracing::instrument(skip(state))]
async fn delete_todo(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let oid = parse_id(&id)?;
    if state.store.delete_by_id(oid).await? {
        info!("todo deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(id))
    }
}

fn parse_id(id: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(id).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Decodes the first JSON value of the body whatever the `Content-Type`
/// header says. Anything after that value is ignored.
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    match serde_json::Deserializer::from_slice(body).into_iter::<T>().next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(ApiError::BadRequest(e.to_string())),
        None => Err(ApiError::BadRequest("EOF".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_accepts_hex_object_ids() {
        let oid = parse_id("65e1a0b2c3d4e5f601234567").unwrap();
        assert_eq!(oid.to_hex(), "65e1a0b2c3d4e5f601234567");
    }

    #[test]
    fn parse_id_rejects_other_strings() {
        assert!(matches!(parse_id("42"), Err(ApiError::BadRequest(_))));
        assert!(matches!(
            parse_id("zze1a0b2c3d4e5f601234567"),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn decode_body_rejects_empty_input() {
        let result: Result<CreateTodo, _> = decode_body(b"");
        assert!(matches!(result, Err(ApiError::BadRequest(ref m)) if m == "EOF"));

        let result: Result<CreateTodo, _> = decode_body(b"  \n");
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn decode_body_ignores_bytes_after_the_first_value() {
        let input: CreateTodo = decode_body(b"{\"title\":\"a\"}\n{\"title\":\"b\"}").unwrap();
        assert_eq!(input.title, "a");

        let input: CreateTodo = decode_body(b"{\"title\":\"c\"} trailing").unwrap();
        assert_eq!(input.title, "c");
    }

    #[test]
    fn decode_body_rejects_truncated_value() {
        let result: Result<CreateTodo, _> = decode_body(b"{\"title\":");
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }
}
