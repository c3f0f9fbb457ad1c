use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

/// Request-level instruments. No-ops unless a meter provider is installed.
#[derive(Clone)]
pub struct PredictMetrics {
    duration: Histogram<f64>,
    requests: Counter<u64>,
    detections: Counter<u64>,
}

impl PredictMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0,
        ];
        let duration = meter
            .f64_histogram("predict_duration_seconds")
            .with_description("Time to serve one predict request (decode + infer + persist)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build();
        let requests = meter
            .u64_counter("predict_requests_total")
            .with_description("Predict requests by outcome")
            .build();
        let detections = meter
            .u64_counter("predict_detections_total")
            .with_description("Total detections returned")
            .build();

        Self {
            duration,
            requests,
            detections,
        }
    }

    pub fn record(&self, outcome: &'static str, seconds: f64, detections: usize) {
        let attrs = [KeyValue::new("outcome", outcome)];
        self.duration.record(seconds, &attrs);
        self.requests.add(1, &attrs);
        if detections > 0 {
            self.detections.add(detections as u64, &[]);
        }
    }
}
