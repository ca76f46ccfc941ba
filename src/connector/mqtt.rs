//! MQTT source connector using rumqttc.
//!
//! Agents publish readings to `/sensors/<machine_id>/<sensor_id>` with a
//! JSON payload `{"timestamp": "<ISO-8601>", "value": <number>}`. When the
//! `mqtt` feature is enabled this module provides full connectivity via
//! `rumqttc`; when disabled, a stub implementation returns
//! `ConnectorError::NotAvailable`.

use super::types::{ConnectorError, SourceConnector};
use crate::reading::SensorReading;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc;
#[cfg(feature = "mqtt")]
use tracing::{error, info, warn};

// =============================================================================
// MQTT Configuration (always available, not feature-gated)
// =============================================================================

/// MQTT configuration
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub topic: String,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub qos: u8,
}

impl MqttConfig {
    pub fn new(broker: &str, topic: &str) -> Self {
        Self {
            broker: broker.to_string(),
            port: 1883,
            topic: topic.to_string(),
            client_id: None,
            username: None,
            password: None,
            qos: 1,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_client_id(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn with_qos(mut self, qos: u8) -> Self {
        self.qos = qos.min(2);
        self
    }
}

// =============================================================================
// Payload decoding (always available, unit-tested without a broker)
// =============================================================================

#[derive(Debug, Deserialize)]
struct ReadingPayload {
    timestamp: String,
    value: f64,
}

/// Decode one inbound message into a reading.
///
/// Returns `None` for topics outside the `/sensors/<machine>/<sensor>` shape
/// or payloads that are not well-formed; callers skip such messages.
pub fn parse_reading(topic: &str, payload: &str) -> Option<SensorReading> {
    let (machine_id, sensor_id) = parse_topic(topic)?;
    let body: ReadingPayload = serde_json::from_str(payload).ok()?;
    let timestamp = parse_timestamp(&body.timestamp)?;
    Some(SensorReading {
        machine_id,
        sensor_id,
        timestamp,
        value: body.value,
    })
}

/// Split `/sensors/<machine_id>/<sensor_id>` into its identifiers.
fn parse_topic(topic: &str) -> Option<(String, String)> {
    let mut parts = topic.split('/');
    // Leading slash yields an empty first segment
    if !parts.next()?.is_empty() {
        return None;
    }
    if parts.next()? != "sensors" {
        return None;
    }
    let machine_id = parts.next()?;
    let sensor_id = parts.next()?;
    if machine_id.is_empty() || sensor_id.is_empty() || parts.next().is_some() {
        return None;
    }
    Some((machine_id.to_string(), sensor_id.to_string()))
}

/// Accept RFC 3339 timestamps, falling back to naive ISO-8601 treated as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// -----------------------------------------------------------------------------
// MQTT with rumqttc feature enabled
// -----------------------------------------------------------------------------
#[cfg(feature = "mqtt")]
mod mqtt_impl {
    use super::*;
    use rumqttc::{AsyncClient, Event as MqttEvent, MqttOptions, Packet, QoS};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn qos_from_u8(qos: u8) -> QoS {
        match qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        }
    }

    /// MQTT source connector with rumqttc
    pub struct MqttSource {
        name: String,
        config: MqttConfig,
        running: Arc<AtomicBool>,
        client: Option<AsyncClient>,
    }

    impl MqttSource {
        pub fn new(name: &str, config: MqttConfig) -> Self {
            Self {
                name: name.to_string(),
                config,
                running: Arc::new(AtomicBool::new(false)),
                client: None,
            }
        }
    }

    #[async_trait]
    impl SourceConnector for MqttSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(&mut self, tx: mpsc::Sender<SensorReading>) -> Result<(), ConnectorError> {
            let client_id = self
                .config
                .client_id
                .clone()
                .unwrap_or_else(|| format!("pulsewatch-{}", std::process::id()));

            let mut mqtt_opts = MqttOptions::new(client_id, &self.config.broker, self.config.port);
            mqtt_opts.set_keep_alive(Duration::from_secs(60));

            if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
                mqtt_opts.set_credentials(user, pass);
            }

            let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 10_000);

            client
                .subscribe(&self.config.topic, qos_from_u8(self.config.qos))
                .await
                .map_err(|e| ConnectorError::ConnectionFailed(e.to_string()))?;

            self.client = Some(client);
            self.running.store(true, Ordering::SeqCst);

            info!(
                "MQTT source {} connected to {}:{}",
                self.name, self.config.broker, self.config.port
            );
            info!("  Subscribed to: {}", self.config.topic);

            let running = self.running.clone();
            let name = self.name.clone();

            tokio::spawn(async move {
                let mut consecutive_errors: u32 = 0;
                const MAX_CONSECUTIVE_ERRORS: u32 = 10;
                const MAX_BACKOFF_SECS: u64 = 30;

                while running.load(Ordering::SeqCst) {
                    match eventloop.poll().await {
                        Ok(MqttEvent::Incoming(Packet::Publish(publish))) => {
                            consecutive_errors = 0;
                            let Ok(payload) = std::str::from_utf8(&publish.payload) else {
                                warn!("MQTT source {} got non-UTF8 payload, skipping", name);
                                continue;
                            };
                            let Some(reading) = parse_reading(&publish.topic, payload) else {
                                warn!(
                                    "MQTT source {} could not decode message on {}, skipping",
                                    name, publish.topic
                                );
                                continue;
                            };
                            if tx.send(reading).await.is_err() {
                                warn!("MQTT source {} channel closed", name);
                                break;
                            }
                        }
                        Ok(_) => {
                            // ConnAck, SubAck and friends also reset the error counter
                            consecutive_errors = 0;
                        }
                        Err(e) => {
                            consecutive_errors += 1;

                            if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                                error!(
                                    "MQTT source {} exceeded max consecutive errors ({}), stopping",
                                    name, MAX_CONSECUTIVE_ERRORS
                                );
                                running.store(false, Ordering::SeqCst);
                                break;
                            }

                            // Exponential backoff: 1s, 2s, 4s, ... up to MAX_BACKOFF_SECS
                            let backoff_secs =
                                (1u64 << (consecutive_errors - 1).min(5)).min(MAX_BACKOFF_SECS);

                            warn!(
                                "MQTT source {} error (attempt {}/{}): {:?}, retrying in {}s",
                                name, consecutive_errors, MAX_CONSECUTIVE_ERRORS, e, backoff_secs
                            );

                            tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        }
                    }
                }
                info!("MQTT source {} eventloop stopped", name);
            });

            Ok(())
        }

        async fn stop(&mut self) -> Result<(), ConnectorError> {
            self.running.store(false, Ordering::SeqCst);
            if let Some(client) = &self.client {
                let _ = client.disconnect().await;
            }
            info!("MQTT source {} stopped", self.name);
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }
}

// -----------------------------------------------------------------------------
// MQTT stub when feature disabled
// -----------------------------------------------------------------------------
#[cfg(not(feature = "mqtt"))]
mod mqtt_impl {
    use super::*;

    pub struct MqttSource {
        name: String,
        #[allow(dead_code)]
        config: MqttConfig,
        running: bool,
    }

    impl MqttSource {
        pub fn new(name: &str, config: MqttConfig) -> Self {
            Self {
                name: name.to_string(),
                config,
                running: false,
            }
        }
    }

    #[async_trait]
    impl SourceConnector for MqttSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn start(
            &mut self,
            _tx: mpsc::Sender<SensorReading>,
        ) -> Result<(), ConnectorError> {
            Err(ConnectorError::NotAvailable(
                "MQTT requires 'mqtt' feature. Build with: cargo build --features mqtt".to_string(),
            ))
        }

        async fn stop(&mut self) -> Result<(), ConnectorError> {
            self.running = false;
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }
}

pub use mqtt_impl::MqttSource;
