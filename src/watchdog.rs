//! Per-stream liveness watchdogs
//!
//! One background task per stream key periodically inspects the most recent
//! timestamp in that stream's window and raises an inactivity alarm when the
//! gap exceeds the staleness threshold. The registry of watched keys is
//! lock-guarded so the check-then-start sequence is atomic: two readings for
//! the same new key can never start two watchdogs.

use crate::config::AnalyzerConfig;
use crate::metrics::Metrics;
use crate::reading::StreamKey;
use crate::sink::{MetricRecord, MetricSink};
use crate::window::WindowStore;
use chrono::Utc;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Starts and tracks one liveness watchdog per stream key.
pub struct WatchdogManager {
    store: Arc<WindowStore>,
    sink: Arc<dyn MetricSink>,
    config: AnalyzerConfig,
    metrics: Option<Metrics>,
    registry: Mutex<FxHashSet<StreamKey>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WatchdogManager {
    pub fn new(store: Arc<WindowStore>, sink: Arc<dyn MetricSink>, config: AnalyzerConfig) -> Self {
        Self {
            store,
            sink,
            config,
            metrics: None,
            registry: Mutex::new(FxHashSet::default()),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Ensure a watchdog is running for this key.
    ///
    /// Idempotent and first-caller-wins: returns `true` only for the caller
    /// that actually started the task. A key transitions NotStarted → Running
    /// exactly once and is never removed.
    pub async fn ensure(&self, key: &StreamKey) -> bool {
        let mut registry = self.registry.lock().await;
        if registry.contains(key) {
            return false;
        }
        registry.insert(key.clone());

        let handle = tokio::spawn(watch_stream(
            key.clone(),
            self.store.clone(),
            self.sink.clone(),
            self.config.watchdog_interval,
            self.config.stale_threshold,
            self.metrics.clone(),
        ));
        self.handles.lock().await.push(handle);

        if let Some(metrics) = &self.metrics {
            metrics.set_watchdog_count(registry.len());
        }
        debug!("started liveness watchdog for {}", key);
        true
    }

    /// Number of keys with a running watchdog.
    pub async fn watched_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    /// Abort all watchdog tasks. Called once at shutdown.
    pub async fn stop_all(&self) {
        for handle in self.handles.lock().await.drain(..) {
            handle.abort();
        }
        debug!("all watchdogs stopped");
    }
}

/// Periodic staleness check for one stream. Runs until aborted.
async fn watch_stream(
    key: StreamKey,
    store: Arc<WindowStore>,
    sink: Arc<dyn MetricSink>,
    interval: Duration,
    stale_threshold: Duration,
    metrics: Option<Metrics>,
) {
    let mut ticker = tokio::time::interval(interval);
    // Skip the immediate first tick
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let snapshot = store.snapshot(&key).await;
        let Some(last) = snapshot.last_timestamp() else {
            // Nothing recorded yet for this stream
            continue;
        };

        let gap = (Utc::now() - last).to_std().unwrap_or(Duration::ZERO);
        if gap <= stale_threshold {
            continue;
        }

        // Re-emitted every stale tick: the alarm stays visible on the
        // dashboard until the stream recovers.
        let now = Utc::now();
        warn!("no readings from {} for {:?}, raising inactivity alarm", key, gap);
        if let Some(metrics) = &metrics {
            metrics.record_alarm("inactive");
        }
        let record = MetricRecord::new(key.inactivity_alarm_path(), 1.0, now);
        if let Err(e) = sink.post(&record).await {
            warn!("sink {} rejected {}: {}", sink.name(), record.path, e);
            if let Some(metrics) = &metrics {
                metrics.record_sink_error();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use chrono::Duration as ChronoDuration;

    fn fast_config() -> AnalyzerConfig {
        AnalyzerConfig::new()
            .with_watchdog_interval(Duration::from_millis(10))
            .with_stale_threshold(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let store = Arc::new(WindowStore::new(5));
        let sink = Arc::new(MemorySink::new("mem"));
        let manager = WatchdogManager::new(store, sink, fast_config());
        let key = StreamKey::new("m1", "cpu_usage");

        assert!(manager.ensure(&key).await);
        assert!(!manager.ensure(&key).await);
        assert_eq!(manager.watched_count().await, 1);

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_ensure_concurrent_starts_one_task() {
        let store = Arc::new(WindowStore::new(5));
        let sink = Arc::new(MemorySink::new("mem"));
        let manager = Arc::new(WatchdogManager::new(store, sink, fast_config()));
        let key = StreamKey::new("m1", "cpu_usage");

        let (a, b) = tokio::join!(manager.ensure(&key), manager.ensure(&key));
        assert!(a ^ b, "exactly one caller should start the watchdog");
        assert_eq!(manager.watched_count().await, 1);

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_watchdog_alarms_on_stale_stream() {
        let store = Arc::new(WindowStore::new(5));
        let sink = Arc::new(MemorySink::new("mem"));
        let manager = WatchdogManager::new(store.clone(), sink.clone(), fast_config());
        let key = StreamKey::new("m1", "cpu_usage");

        // Last reading well past the staleness threshold
        let stale_ts = Utc::now() - ChronoDuration::seconds(3600);
        store.record(&key, 42.0, stale_ts).await;

        manager.ensure(&key).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        manager.stop_all().await;

        let alarms = sink
            .records_for("machines.m1.alarms.inactive_cpu_usage")
            .await;
        assert!(
            alarms.len() >= 2,
            "expected repeated inactivity alarms, got {}",
            alarms.len()
        );
        assert!(alarms.iter().all(|r| r.value == 1.0));
    }

    #[tokio::test]
    async fn test_watchdog_quiet_for_empty_window() {
        let store = Arc::new(WindowStore::new(5));
        let sink = Arc::new(MemorySink::new("mem"));
        let manager = WatchdogManager::new(store, sink.clone(), fast_config());
        let key = StreamKey::new("m1", "cpu_usage");

        // Watchdog started before any reading is recorded
        manager.ensure(&key).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        manager.stop_all().await;

        assert!(sink.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_watchdog_quiet_for_fresh_stream() {
        let store = Arc::new(WindowStore::new(5));
        let sink = Arc::new(MemorySink::new("mem"));
        let config = AnalyzerConfig::new()
            .with_watchdog_interval(Duration::from_millis(10))
            .with_stale_threshold(Duration::from_secs(3600));
        let manager = WatchdogManager::new(store.clone(), sink.clone(), config);
        let key = StreamKey::new("m1", "cpu_usage");

        store.record(&key, 42.0, Utc::now()).await;
        manager.ensure(&key).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        manager.stop_all().await;

        assert!(sink.records().await.is_empty());
    }
}
