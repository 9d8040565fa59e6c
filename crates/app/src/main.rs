mod dashboard;
mod ipc;
mod problem;
mod router;
mod telemetry;
mod worker;

use std::net::SocketAddr;

use farmhand_storage::Database;
use farmhand_util::{load_env_file, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "storage", url = %config.database_url, "database migrated");

    let state = router::AppState::new(metrics, database, &config);

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting IPC bridge");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router::app_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|err| err.into())
}
