use crate::Environment;
use crate::logging::{BoxedLayer, init_subscriber};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::attribute::{SERVICE_NAME, SERVICE_VERSION};
use std::time::Duration;

const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

/// OTLP/gRPC export of spans and metrics for one service process.
///
/// Owns the global `tracing` subscriber as well: a process calls either this
/// or [`crate::setup_logging`]. Providers are flushed and shut down on drop.
///
/// ```ignore
/// let _telemetry = TelemetryGuard::init("gateway", "http://otel-collector:4317", Environment::Production)?;
/// ```
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    /// Must run inside a Tokio runtime; the batch exporters spawn onto it.
    pub fn init(
        service_name: &str,
        endpoint: &str,
        environment: Environment,
    ) -> anyhow::Result<Self> {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let resource = service_resource(service_name, environment);
        let tracer_provider = tracer_provider(endpoint, resource.clone())?;
        let meter_provider = meter_provider(endpoint, resource)?;

        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());

        let tracer = tracer_provider.tracer(service_name.to_string());
        let otel_layer: BoxedLayer = Box::new(tracing_opentelemetry::layer().with_tracer(tracer));
        init_subscriber(environment, Some(otel_layer));

        tracing::info!(service_name, endpoint, "Exporting traces and metrics");

        Ok(Self {
            tracer_provider,
            meter_provider,
        })
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let results = [
            ("tracer", self.tracer_provider.shutdown()),
            ("meter", self.meter_provider.shutdown()),
        ];
        for (provider, result) in results {
            if let Err(e) = result {
                eprintln!("Failed to shut down {provider} provider: {e:?}");
            }
        }
    }
}

fn service_resource(service_name: &str, environment: Environment) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new(SERVICE_NAME, service_name.to_string()),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", environment.as_str()),
        ])
        .build()
}

fn tracer_provider(endpoint: &str, resource: Resource) -> anyhow::Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        .with_batch_exporter(exporter)
        .build())
}

fn meter_provider(endpoint: &str, resource: Resource) -> anyhow::Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(METRICS_EXPORT_INTERVAL)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}

/// Enters an info-level span for the rest of the enclosing scope.
///
/// Synchronous code only: the guard must not be held across an `.await`.
#[macro_export]
macro_rules! span {
    ($name:literal) => {
        tracing::info_span!($name).entered()
    };
}
