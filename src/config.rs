//! Analyzer tunables

use std::time::Duration;

/// Tunables for the streaming analyzer.
///
/// Defaults follow the latest observed behavior of the monitored fleet:
/// a five-sample window, an outlier threshold of 1.0 standard deviations,
/// 20-second watchdog ticks, and a 30-second staleness threshold. Earlier
/// deployments ran with an outlier threshold of 5.0 and a staleness
/// threshold of ten reporting intervals; both remain configurable here.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Number of readings kept per stream window.
    pub window_size: usize,
    /// Absolute z-score above which a reading is flagged as an outlier.
    pub outlier_threshold: f64,
    /// Interval between watchdog staleness checks.
    pub watchdog_interval: Duration,
    /// Gap since the last reading beyond which a stream is considered stale.
    pub stale_threshold: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            outlier_threshold: 1.0,
            watchdog_interval: Duration::from_secs(20),
            stale_threshold: Duration::from_secs(30),
        }
    }
}

impl AnalyzerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    pub fn with_outlier_threshold(mut self, threshold: f64) -> Self {
        self.outlier_threshold = threshold;
        self
    }

    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = interval;
        self
    }

    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }
}
