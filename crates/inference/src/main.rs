use common::TelemetryGuard;
use inference::{InferenceConfig, InferenceService, LabelVocabulary, logging::setup_logging};

#[cfg(feature = "ort-backend")]
use inference::backend::ort::OrtBackend as Backend;

#[cfg(not(feature = "ort-backend"))]
compile_error!("The 'ort-backend' feature must be enabled to build the inference binary");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = InferenceConfig::from_env()?;

    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init(
            "inference",
            endpoint,
            config.environment,
        )?),
        None => {
            setup_logging(&config);
            None
        }
    };

    tracing::info!(config = ?config, "Loaded configuration");

    let labels = LabelVocabulary::load(&config.labels_path)?;
    tracing::info!(
        labels = labels.len(),
        path = %config.labels_path.display(),
        "Loaded label vocabulary"
    );

    tracing::info!("Loading inference model");
    let backend = Backend::load_model_with_options(&config.model_path, config.transpose_output)?;
    tracing::info!("Model loaded successfully");

    let service = InferenceService::new(backend, labels, config);
    service.run().await
}
