//! Source connectors feeding decoded readings into the processor.
//!
//! The analyzer core only consumes [`SensorReading`](crate::reading::SensorReading)
//! values; connectors own transport, topic parsing, and payload decoding.

mod mqtt;
mod types;

pub use mqtt::{parse_reading, MqttConfig, MqttSource};
pub use types::{ConnectorError, SourceConnector};
