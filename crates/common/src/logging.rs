use crate::config::Environment;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

pub(crate) type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber: pretty output in development, one JSON
/// object per line in production. `RUST_LOG` overrides the `info` default.
pub fn setup_logging(environment: Environment) {
    init_subscriber(environment, None);
}

/// Same as [`setup_logging`], with an optional layer (OpenTelemetry) below the filter.
pub(crate) fn init_subscriber(environment: Environment, otel_layer: Option<BoxedLayer>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (json, pretty) = match environment {
        Environment::Production => (
            Some(fmt::layer().json().with_current_span(true).with_target(true)),
            None,
        ),
        Environment::Development => (None, Some(fmt::layer().pretty().with_ansi(true))),
    };

    let installed = tracing_subscriber::registry()
        .with(otel_layer)
        .with(filter)
        .with(json)
        .with(pretty)
        .try_init();

    if let Err(e) = installed {
        eprintln!("Global subscriber already installed: {e}");
    }
}
