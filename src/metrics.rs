//! Prometheus metrics for Pulsewatch

use prometheus::{Counter, CounterVec, Gauge, Opts, Registry};
use std::sync::Arc;

/// Self-metrics for the analyzer.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub readings_total: CounterVec,
    pub alarms_total: CounterVec,
    pub sink_errors_total: Counter,
    pub active_watchdogs: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let readings_total = CounterVec::new(
            Opts::new("pulsewatch_readings_total", "Total readings processed"),
            &["sensor"],
        )
        .expect("failed to create readings_total counter");

        let alarms_total = CounterVec::new(
            Opts::new("pulsewatch_alarms_total", "Total alarms raised"),
            &["kind"],
        )
        .expect("failed to create alarms_total counter");

        let sink_errors_total = Counter::new(
            "pulsewatch_sink_errors_total",
            "Metric emissions that failed",
        )
        .expect("failed to create sink_errors_total counter");

        let active_watchdogs = Gauge::new(
            "pulsewatch_active_watchdogs",
            "Number of running liveness watchdogs",
        )
        .expect("failed to create active_watchdogs gauge");

        registry
            .register(Box::new(readings_total.clone()))
            .expect("failed to register readings_total");
        registry
            .register(Box::new(alarms_total.clone()))
            .expect("failed to register alarms_total");
        registry
            .register(Box::new(sink_errors_total.clone()))
            .expect("failed to register sink_errors_total");
        registry
            .register(Box::new(active_watchdogs.clone()))
            .expect("failed to register active_watchdogs");

        Self {
            registry: Arc::new(registry),
            readings_total,
            alarms_total,
            sink_errors_total,
            active_watchdogs,
        }
    }

    /// Record an incoming reading
    pub fn record_reading(&self, sensor: &str) {
        self.readings_total.with_label_values(&[sensor]).inc();
    }

    /// Record a raised alarm (`outlier` or `inactive`)
    pub fn record_alarm(&self, kind: &str) {
        self.alarms_total.with_label_values(&[kind]).inc();
    }

    /// Record a failed metric emission
    pub fn record_sink_error(&self) {
        self.sink_errors_total.inc();
    }

    /// Set the number of running watchdogs
    pub fn set_watchdog_count(&self, count: usize) {
        self.active_watchdogs.set(count as f64);
    }

    /// Get Prometheus text output
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
