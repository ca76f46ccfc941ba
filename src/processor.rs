//! End-to-end handling of one incoming reading
//!
//! The [`StreamProcessor`] updates the window store, computes derived
//! statistics over the updated window, emits raw and derived metrics, and
//! ensures a liveness watchdog exists for the stream. Every emission is an
//! independent best-effort call: a failed one is logged and counted, and
//! never suppresses the remaining emissions or future readings.

use crate::config::AnalyzerConfig;
use crate::metrics::Metrics;
use crate::reading::SensorReading;
use crate::sink::{MetricRecord, MetricSink};
use crate::stats;
use crate::watchdog::WatchdogManager;
use crate::window::WindowStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Orchestrates one incoming reading end-to-end.
pub struct StreamProcessor {
    store: Arc<WindowStore>,
    sink: Arc<dyn MetricSink>,
    watchdogs: Arc<WatchdogManager>,
    config: AnalyzerConfig,
    metrics: Option<Metrics>,
}

impl StreamProcessor {
    pub fn new(
        store: Arc<WindowStore>,
        sink: Arc<dyn MetricSink>,
        watchdogs: Arc<WatchdogManager>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            store,
            sink,
            watchdogs,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Process one reading: update the window, emit raw and derived metrics,
    /// raise an outlier alarm if warranted, and ensure a watchdog exists.
    pub async fn process(&self, reading: SensorReading) {
        let key = reading.key();
        debug!("processing reading {} = {}", key, reading.value);
        if let Some(metrics) = &self.metrics {
            metrics.record_reading(&reading.sensor_id);
        }

        let window = self
            .store
            .record(&key, reading.value, reading.timestamp)
            .await;

        self.emit(MetricRecord::new(
            key.raw_path(),
            reading.value,
            reading.timestamp,
        ))
        .await;

        if !window.is_empty() {
            let average = stats::moving_average(&window.values);
            self.emit(MetricRecord::new(
                key.moving_average_path(),
                average,
                reading.timestamp,
            ))
            .await;

            // The just-recorded value is part of the window it is scored
            // against, matching the post-update snapshot contract.
            let z = stats::z_score(reading.value, &window.values);
            if z.abs() > self.config.outlier_threshold {
                warn!("outlier on {}: value {} (z-score {:.2})", key, reading.value, z);
                if let Some(metrics) = &self.metrics {
                    metrics.record_alarm("outlier");
                }
                self.emit(MetricRecord::new(
                    key.outlier_alarm_path(),
                    1.0,
                    reading.timestamp,
                ))
                .await;
            }

            let trend = stats::trend_slope(&window.values);
            self.emit(MetricRecord::new(
                key.trend_path(),
                trend,
                reading.timestamp,
            ))
            .await;
        }

        self.watchdogs.ensure(&key).await;
    }

    async fn emit(&self, record: MetricRecord) {
        if let Err(e) = self.sink.post(&record).await {
            warn!("sink {} rejected {}: {}", self.sink.name(), record.path, e);
            if let Some(metrics) = &self.metrics {
                metrics.record_sink_error();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, SinkError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    fn quiet_config() -> AnalyzerConfig {
        // Long watchdog timings so ticks never fire during these tests
        AnalyzerConfig::new()
            .with_watchdog_interval(Duration::from_secs(3600))
            .with_stale_threshold(Duration::from_secs(3600))
    }

    fn build(
        sink: Arc<dyn MetricSink>,
        config: AnalyzerConfig,
    ) -> (StreamProcessor, Arc<WatchdogManager>) {
        let store = Arc::new(WindowStore::new(config.window_size));
        let watchdogs = Arc::new(WatchdogManager::new(
            store.clone(),
            sink.clone(),
            config.clone(),
        ));
        (
            StreamProcessor::new(store, sink, watchdogs.clone(), config),
            watchdogs,
        )
    }

    #[tokio::test]
    async fn test_first_reading_emits_raw_average_and_trend() {
        let sink = Arc::new(MemorySink::new("mem"));
        let (processor, watchdogs) = build(sink.clone(), quiet_config());

        processor
            .process(SensorReading::new("m1", "cpu_usage", 42.0))
            .await;

        let records = sink.records().await;
        let paths: Vec<&str> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "machines.m1.cpu_usage",
                "machines.m1.cpu_usage.cpu_usage_moving_average",
                "machines.m1.cpu_usage.cpu_usage_trend",
            ]
        );
        // Single-value window: average is the value, z is 0 (no outlier), trend 0
        assert_eq!(records[0].value, 42.0);
        assert_eq!(records[1].value, 42.0);
        assert_eq!(records[2].value, 0.0);
        assert_eq!(watchdogs.watched_count().await, 1);

        watchdogs.stop_all().await;
    }

    #[tokio::test]
    async fn test_outlier_raises_alarm() {
        let sink = Arc::new(MemorySink::new("mem"));
        let (processor, watchdogs) = build(sink.clone(), quiet_config());

        for v in [10.0, 10.0, 10.0, 10.0] {
            processor.process(SensorReading::new("m1", "cpu_usage", v)).await;
        }
        processor
            .process(SensorReading::new("m1", "cpu_usage", 100.0))
            .await;

        let alarms = sink.records_for("machines.m1.alarms.cpu_usage_outlier").await;
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].value, 1.0);

        watchdogs.stop_all().await;
    }

    #[tokio::test]
    async fn test_steady_stream_raises_no_alarm() {
        let sink = Arc::new(MemorySink::new("mem"));
        let (processor, watchdogs) = build(sink.clone(), quiet_config());

        for v in [10.0, 10.0, 10.0, 10.0, 10.0] {
            processor.process(SensorReading::new("m1", "cpu_usage", v)).await;
        }

        assert!(sink
            .records_for("machines.m1.alarms.cpu_usage_outlier")
            .await
            .is_empty());

        watchdogs.stop_all().await;
    }

    #[tokio::test]
    async fn test_streams_do_not_cross_contaminate() {
        let sink = Arc::new(MemorySink::new("mem"));
        let (processor, watchdogs) = build(sink.clone(), quiet_config());

        // Same sensor type on two machines: windows must stay independent
        for v in [10.0, 20.0, 30.0] {
            processor.process(SensorReading::new("m1", "cpu_usage", v)).await;
        }
        processor
            .process(SensorReading::new("m2", "cpu_usage", 500.0))
            .await;

        // m2's first reading is alone in its window: average equals the value
        let m2_avg = sink
            .records_for("machines.m2.cpu_usage.cpu_usage_moving_average")
            .await;
        assert_eq!(m2_avg.len(), 1);
        assert_eq!(m2_avg[0].value, 500.0);
        assert_eq!(watchdogs.watched_count().await, 2);

        watchdogs.stop_all().await;
    }

    /// Sink that always fails, to prove emissions are independent.
    struct FailingSink;

    #[async_trait]
    impl MetricSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn post(&self, _record: &MetricRecord) -> Result<(), SinkError> {
            Err(SinkError::ConnectionFailed("refused".into()))
        }
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_abort_processing() {
        let sink: Arc<dyn MetricSink> = Arc::new(FailingSink);
        let (processor, watchdogs) = build(sink, quiet_config());

        processor
            .process(SensorReading::new("m1", "cpu_usage", 42.0))
            .await;
        processor
            .process(SensorReading::new("m1", "cpu_usage", 43.0))
            .await;

        // Processing survived every failed emission and still started a watchdog
        assert_eq!(watchdogs.watched_count().await, 1);

        watchdogs.stop_all().await;
    }

    #[tokio::test]
    async fn test_reading_timestamp_flows_to_records() {
        let sink = Arc::new(MemorySink::new("mem"));
        let (processor, watchdogs) = build(sink.clone(), quiet_config());

        let ts = Utc::now() - chrono::Duration::seconds(90);
        processor
            .process(SensorReading::new("m1", "cpu_usage", 1.0).with_timestamp(ts))
            .await;

        let records = sink.records().await;
        assert!(records.iter().all(|r| r.timestamp == ts));

        watchdogs.stop_all().await;
    }
}
