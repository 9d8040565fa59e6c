pub mod config;

use std::{env, net::SocketAddr};

pub use config::{AppConfig, AuditDefaults, ConfigError, Environment};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://farmhand.db";

/// Loads environment variables from `.env` when available.
///
/// Missing files are ignored so the function is safe in packaged builds
/// where dotenv files are not shipped.
pub fn load_env_file() {
    let _ = dotenvy::dotenv();
}

/// Returns the loopback address the IPC bridge should bind to.
///
/// The value is resolved from the `APP_BIND_ADDR` environment variable and
/// falls back to [`DEFAULT_BIND_ADDR`] when the variable is not set.
pub fn server_bind_address() -> Result<SocketAddr, std::net::AddrParseError> {
    let value = env::var("APP_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    value.parse()
}

/// Returns the SQLite connection string from `DATABASE_URL`.
pub fn database_url() -> String {
    env::var("DATABASE_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}
