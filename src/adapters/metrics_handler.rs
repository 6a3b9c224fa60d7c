use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::trigger_index::TriggerOutcome;

pub struct MetricsCollector {
    registry: Registry,

    // Mock request metrics
    pub requests_total: CounterVec,
    pub request_duration: HistogramVec,
    pub simulated_errors: CounterVec,

    // Trigger metrics
    pub trigger_events: CounterVec,

    // Spec cache metrics
    pub spec_loads: CounterVec,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("mirage_requests_total", "Total number of mock requests"),
            &["method", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("mirage_request_duration_seconds", "Mock request duration in seconds"),
            &["method"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let simulated_errors = CounterVec::new(
            Opts::new("mirage_simulated_errors_total", "Responses replaced by a simulated failure"),
            &["operation"],
        )?;
        registry.register(Box::new(simulated_errors.clone()))?;

        let trigger_events = CounterVec::new(
            Opts::new("mirage_trigger_events_total", "Trigger rules processed after mock responses"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(trigger_events.clone()))?;

        let spec_loads = CounterVec::new(
            Opts::new("mirage_spec_loads_total", "Spec documents loaded into the cache"),
            &["document", "source"],
        )?;
        registry.register(Box::new(spec_loads.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            simulated_errors,
            trigger_events,
            spec_loads,
        })
    }

    pub fn record_request(&self, method: &str, status: u16, elapsed: Duration) {
        self.requests_total
            .with_label_values(&[method, &status.to_string()])
            .inc();
        self.request_duration
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_triggers(&self, operation: &str, outcome: &TriggerOutcome) {
        let counts = [
            ("emitted", outcome.emitted),
            ("scheduled", outcome.scheduled),
            ("skipped", outcome.skipped),
            ("failed", outcome.failed),
        ];
        for (label, count) in counts {
            if count > 0 {
                self.trigger_events
                    .with_label_values(&[operation, label])
                    .inc_by(count as f64);
            }
        }
    }

    pub fn record_spec_load(&self, document: &str, source: &str) {
        self.spec_loads.with_label_values(&[document, source]).inc();
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub struct MetricsHandler {
    collector: Arc<MetricsCollector>,
}

impl MetricsHandler {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }

    pub async fn metrics(&self) -> String {
        self.collector.encode().unwrap_or_else(|e| {
            tracing::error!("Failed to encode metrics: {}", e);
            String::from("# Error encoding metrics\n")
        })
    }
}
