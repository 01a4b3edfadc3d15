use std::{net::SocketAddr, time::Duration};

use clap::Parser;

/// Startup configuration. Every flag falls back to an environment variable;
/// nothing is reloaded after the process starts.
#[derive(Debug, Clone, Parser)]
#[command(name = "todos-server", version, about = "JSON CRUD service for todos")]
pub struct Config {
    /// Store to connect to; the scheme selects the backend
    /// (`mongodb://`, `redis://` or `memory://`).
    #[arg(long, env = "DATABASE_URL", default_value = "mongodb://localhost:27017")]
    pub database_url: String,

    #[arg(long, env = "DATABASE_NAME", default_value = "reminders-test")]
    pub database_name: String,

    /// Collection (MongoDB) or key prefix (Redis) holding the todos.
    #[arg(long, env = "TODOS_COLLECTION", default_value = "todos")]
    pub collection: String,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    /// Abort requests running longer than this. Unset means no limit.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
