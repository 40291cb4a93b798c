use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use prometheus::Registry;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to build Prometheus exporter: {0}")]
    Exporter(String),
}

pub struct Metrics {
    request_counter: Counter<u64>,
    prediction_duration: Histogram<u64>,
    rejection_counter: Counter<u64>,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, TelemetryError> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::builder()
            .with_reader(exporter)
            .build();

        let meter = provider.meter("lesion_web");
        global::set_meter_provider(provider);

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let prediction_duration = meter
            .u64_histogram("prediction_duration_ms")
            .with_boundaries(generate_boundaries(&[
                (10, 100, 10),
                (100, 500, 25),
                (500, 2000, 100),
                (2000, 10000, 1000),
            ]))
            .with_description("Duration of image classification in milliseconds")
            .build();

        let rejection_counter = meter
            .u64_counter("upload_rejections_total")
            .with_description("Uploads rejected before or during decoding")
            .build();

        Ok(Metrics {
            request_counter,
            prediction_duration,
            rejection_counter,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        let attributes = [KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_prediction_duration(&self, duration_ms: u64, route: &str) {
        let attributes = [KeyValue::new("route", route.to_string())];
        self.prediction_duration.record(duration_ms, &attributes);
    }

    pub fn record_rejection(&self, reason: &'static str) {
        let attributes = [KeyValue::new("reason", reason)];
        self.rejection_counter.add(1, &attributes);
    }
}

/// Histogram bucket edges from `(start, end, step)` ranges, deduplicated where
/// ranges meet.
fn generate_boundaries(ranges: &[(u32, u32, usize)]) -> Vec<f64> {
    let mut boundaries: Vec<u32> = Vec::new();
    for &(start, end, step) in ranges {
        for edge in (start..=end).step_by(step.max(1)) {
            if boundaries.last().map_or(true, |last| edge > *last) {
                boundaries.push(edge);
            }
        }
    }
    boundaries.into_iter().map(f64::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_boundaries() {
        let get = generate_boundaries(&[(2, 22, 10), (22, 26, 2), (26, 46, 20), (46, 146, 100)]);
        let expected = vec![2.0, 12.0, 22.0, 24.0, 26.0, 46.0, 146.0];

        assert_eq!(get, expected);
    }

    #[test]
    fn test_metrics_are_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("/");
        metrics.record_rejection("invalid-image");

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();

        assert!(names.iter().any(|n| n.starts_with("requests_total")));
        assert!(names.iter().any(|n| n.starts_with("upload_rejections_total")));
    }
}
