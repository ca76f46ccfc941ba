//! Connector trait and error definitions

use crate::reading::SensorReading;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Trait for source connectors that ingest readings from external systems.
///
/// A source connects to an external transport, decodes inbound messages into
/// [`SensorReading`] values, and forwards them over the provided channel.
/// Malformed messages are skipped, never fatal.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Returns the name/identifier of this connector instance.
    fn name(&self) -> &str;

    /// Start receiving readings and forward them to the provided channel.
    async fn start(&mut self, tx: mpsc::Sender<SensorReading>) -> Result<(), ConnectorError>;

    /// Stop the connector gracefully.
    async fn stop(&mut self) -> Result<(), ConnectorError>;

    /// Check if the connector is currently running.
    fn is_running(&self) -> bool;
}

/// Errors that can occur during connector operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Failed to establish connection to the external system.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to receive a message from the source.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Operation attempted on a disconnected connector.
    #[error("Not connected")]
    NotConnected,

    /// Requested connector type is not available.
    /// May require enabling a feature flag (e.g., `mqtt`).
    #[error("Connector not available: {0}")]
    NotAvailable(String),
}
