// Prometheus metrics for the /ask path
//
// Observation only: every method is an in-memory increment and never fails.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

/// Latency buckets in seconds. Local models answer in seconds to minutes.
const LATENCY_BUCKETS: &[f64] = &[
    0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 90.0, 120.0, 180.0,
];

/// Request counters, switch counter and latency histogram
#[derive(Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    requests: IntCounterVec,
    model_switches: IntCounter,
    latency: Histogram,
}

impl GatewayMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("llm_requests_total", "Number of /ask calls"),
            &["success"],
        )?;
        let model_switches =
            IntCounter::new("llm_model_switch_total", "LLM model switches")?;
        let latency = Histogram::with_opts(
            HistogramOpts::new("llm_request_latency_seconds", "Time spent in /ask")
                .buckets(LATENCY_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(model_switches.clone()))?;
        registry.register(Box::new(latency.clone()))?;

        Ok(Self {
            registry,
            requests,
            model_switches,
            latency,
        })
    }

    /// Count a successful request and observe its latency
    pub fn record_success(&self, latency_secs: f64) {
        self.requests.with_label_values(&["true"]).inc();
        self.latency.observe(latency_secs);
    }

    /// Count a failed request
    pub fn record_failure(&self) {
        self.requests.with_label_values(&["false"]).inc();
    }

    pub fn record_model_switch(&self) {
        self.model_switches.inc();
    }

    pub fn requests_total(&self, success: bool) -> u64 {
        let label = if success { "true" } else { "false" };
        self.requests.with_label_values(&[label]).get()
    }

    pub fn model_switches(&self) -> u64 {
        self.model_switches.get()
    }

    pub fn latency_samples(&self) -> u64 {
        self.latency.get_sample_count()
    }

    /// Text exposition format for scraping
    pub fn render(&self) -> prometheus::Result<String> {
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = GatewayMetrics::new().unwrap();
        metrics.record_success(1.5);
        metrics.record_success(0.3);
        metrics.record_failure();
        metrics.record_model_switch();

        assert_eq!(metrics.requests_total(true), 2);
        assert_eq!(metrics.requests_total(false), 1);
        assert_eq!(metrics.model_switches(), 1);
        assert_eq!(metrics.latency_samples(), 2);
    }

    #[test]
    fn test_failures_do_not_observe_latency() {
        let metrics = GatewayMetrics::new().unwrap();
        metrics.record_failure();
        assert_eq!(metrics.latency_samples(), 0);
    }

    #[test]
    fn test_render_text_format() {
        let metrics = GatewayMetrics::new().unwrap();
        metrics.record_success(2.0);
        metrics.record_failure();

        let text = metrics.render().unwrap();
        assert!(text.contains("llm_requests_total{success=\"true\"} 1"));
        assert!(text.contains("llm_requests_total{success=\"false\"} 1"));
        assert!(text.contains("llm_model_switch_total 0"));
        assert!(text.contains("llm_request_latency_seconds_count 1"));
        assert!(metrics.content_type().starts_with("text/plain"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = GatewayMetrics::new().unwrap();
        let b = GatewayMetrics::new().unwrap();
        a.record_model_switch();
        assert_eq!(b.model_switches(), 0);
    }
}
