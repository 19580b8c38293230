use tracing::info;
use tracing_subscriber::EnvFilter;

use tracepoint_core::TelemetryService;
use tracepoint_http::{serve, AppState, ServerConfig};
use tracepoint_store::StorageConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let storage = StorageConfig::load()?;
    info!(?storage, "Storage configuration loaded");
    let server = ServerConfig::load()?;

    let telemetry = TelemetryService::from_config(&storage)?;
    serve(server, AppState::new(telemetry)).await
}
