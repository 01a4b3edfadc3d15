//! HTTP service exposing CRUD over todos kept in a document store.

pub mod config;
pub mod error;
pub mod routes;
pub mod store;

pub use config::Config;
pub use error::ApiError;
pub use routes::{app, AppState};
