use common::TelemetryGuard;
use gateway::{config::get_configuration, logging::setup_logging, service};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration()?;

    let _telemetry = match config.otel_endpoint.as_deref().filter(|e| !e.is_empty()) {
        Some(endpoint) => Some(TelemetryGuard::init(
            "gateway",
            endpoint,
            config.environment(),
        )?),
        None => {
            setup_logging(&config);
            None
        }
    };

    tracing::info!(config = ?config, "Loaded configuration");

    service::run(config).await
}
