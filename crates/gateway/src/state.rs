use crate::{config::Config, relay::InferenceClient};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub client: InferenceClient,
    pub upload_dir: Arc<PathBuf>,
    pub metrics: RelayMetrics,
}

impl AppState {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            client: InferenceClient::new(&config.inference_url, config.relay_timeout())?,
            upload_dir: Arc::new(config.upload_dir.clone()),
            metrics: RelayMetrics::new("gateway"),
        })
    }
}

/// No-ops unless a meter provider is installed.
#[derive(Clone)]
pub struct RelayMetrics {
    requests: Counter<u64>,
    failures: Counter<u64>,
}

impl RelayMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let requests = meter
            .u64_counter("relay_requests_total")
            .with_description("Detect requests received")
            .build();
        let failures = meter
            .u64_counter("relay_failures_total")
            .with_description("Detect requests that did not return detections, by status")
            .build();
        Self { requests, failures }
    }

    pub fn record_request(&self) {
        self.requests.add(1, &[]);
    }

    pub fn record_failure(&self, status: u16) {
        self.failures
            .add(1, &[KeyValue::new("status", i64::from(status))]);
    }
}
