//! Pulsewatch - streaming sensor telemetry analyzer
//!
//! This crate ingests periodic sensor readings published by remote agents,
//! maintains a sliding window of recent values per sensor stream, computes
//! rolling statistics (moving average, z-score, trend slope), raises outlier
//! and inactivity alarms, and forwards raw and derived values to a
//! Graphite-compatible metrics sink over the Carbon plaintext protocol.

pub mod config;
pub mod connector;
pub mod metrics;
pub mod processor;
pub mod reading;
pub mod sink;
pub mod stats;
pub mod watchdog;
pub mod window;

pub use config::AnalyzerConfig;
pub use metrics::Metrics;
pub use processor::StreamProcessor;
pub use reading::{SensorReading, StreamKey};
pub use sink::{CarbonSink, ConsoleSink, MemorySink, MetricRecord, MetricSink, SinkError};
pub use watchdog::WatchdogManager;
pub use window::{ReadingWindow, WindowSnapshot, WindowStore};
