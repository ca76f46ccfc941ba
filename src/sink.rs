//! Metric sink clients speaking the Carbon plaintext protocol

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

/// One metric on its way to the sink. Constructed and discarded per emission.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub path: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricRecord {
    pub fn new(path: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            value,
            timestamp,
        }
    }

    /// Carbon plaintext form: `<path> <value> <unix_timestamp>\n`.
    pub fn line(&self) -> String {
        format!("{} {} {}\n", self.path, self.value, self.timestamp.timestamp())
    }
}

/// Errors raised by a sink. All are recoverable: the caller logs and moves
/// on, never retries, and never aborts processing.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// Trait for metric sinks.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Name of this sink
    fn name(&self) -> &str;

    /// Transmit one metric record. Each call is independent: no persistent
    /// connection, no batching, no retry.
    async fn post(&self, record: &MetricRecord) -> Result<(), SinkError>;
}

/// Graphite Carbon sink - one short-lived TCP connection per record.
///
/// Connect and write are each bounded by the configured timeout so one slow
/// sink call cannot stall reading processing indefinitely.
pub struct CarbonSink {
    name: String,
    addr: String,
    timeout: Duration,
}

impl CarbonSink {
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MetricSink for CarbonSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn post(&self, record: &MetricRecord) -> Result<(), SinkError> {
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| SinkError::Timeout(self.timeout))?
            .map_err(|e| SinkError::ConnectionFailed(e.to_string()))?;

        let line = record.line();
        tokio::time::timeout(self.timeout, stream.write_all(line.as_bytes()))
            .await
            .map_err(|_| SinkError::Timeout(self.timeout))?
            .map_err(|e| SinkError::SendFailed(e.to_string()))?;

        let _ = stream.shutdown().await;
        debug!("carbon sink {} wrote: {}", self.name, line.trim_end());
        Ok(())
    }
}

/// Console sink - prints line-protocol records to stdout. Useful for local runs.
pub struct ConsoleSink {
    name: String,
}

impl ConsoleSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl MetricSink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn post(&self, record: &MetricRecord) -> Result<(), SinkError> {
        println!("{}", record.line().trim_end());
        Ok(())
    }
}

/// In-memory sink that captures every record. Used by tests to assert on
/// emissions without a network.
#[derive(Default)]
pub struct MemorySink {
    name: String,
    records: Mutex<Vec<MetricRecord>>,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// All records posted so far, in emission order.
    pub async fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().await.clone()
    }

    /// Records whose path matches exactly.
    pub async fn records_for(&self, path: &str) -> Vec<MetricRecord> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetricSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn post(&self, record: &MetricRecord) -> Result<(), SinkError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}
