use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub use common::Environment;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub environment: String,
    pub listen_addr: String,
    pub inference_url: String,
    pub upload_dir: PathBuf,
    pub relay_timeout_ms: u64,
    pub body_limit_bytes: usize,
    #[serde(default)]
    pub otel_endpoint: Option<String>,
}

impl Config {
    pub fn environment(&self) -> Environment {
        Environment::from_name(&self.environment)
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_millis(self.relay_timeout_ms)
    }

    /// Create default configuration for testing
    pub fn test_default() -> Self {
        Self {
            environment: "development".to_string(),
            listen_addr: "127.0.0.1:0".to_string(),
            inference_url: "http://127.0.0.1:5001/predict".to_string(),
            upload_dir: PathBuf::from("uploads"),
            relay_timeout_ms: 30_000,
            body_limit_bytes: 16 * 1024 * 1024,
            otel_endpoint: None,
        }
    }
}

/// Defaults overridden by `GATEWAY_*` environment variables,
/// e.g. `GATEWAY_INFERENCE_URL` or `GATEWAY_RELAY_TIMEOUT_MS`.
pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let config = config::Config::builder()
        .set_default("environment", "development")?
        .set_default("listen_addr", "0.0.0.0:5000")?
        .set_default("inference_url", "http://ai_backend:5001/predict")?
        .set_default("upload_dir", "uploads")?
        .set_default("relay_timeout_ms", 30_000i64)?
        .set_default("body_limit_bytes", 16i64 * 1024 * 1024)?
        .add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    if config.relay_timeout_ms == 0 {
        return Err(config::ConfigError::Message(
            "relay_timeout_ms must be greater than zero".to_string(),
        ));
    }

    Ok(config)
}
