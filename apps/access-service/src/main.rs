#![forbid(unsafe_code)]

use access_service::{init_tracing, AppConfig, PostgresDirectory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("ACCESS_DATABASE_URL is required for runtime"))?;
    let directory = PostgresDirectory::connect_lazy(database_url, config.db_max_connections)
        .map_err(|e| anyhow::anyhow!("invalid ACCESS_DATABASE_URL: {e}"))?;
    directory
        .ensure_schema()
        .await
        .map_err(|e| anyhow::anyhow!("schema bootstrap failed: {e}"))?;

    tracing::info!(
        event = "db.init",
        outcome = "ready",
        operation_timeout_ms = u64::try_from(config.operation_timeout.as_millis()).unwrap_or(u64::MAX),
        notification_queue = config.notification_queue,
        "access-service schema ready"
    );
    Ok(())
}
