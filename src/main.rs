//! Pulsewatch - streaming sensor statistics and liveness monitoring
//!
//! Subscribes to sensor readings over MQTT, maintains per-stream sliding
//! windows, and feeds raw values plus derived statistics (moving average,
//! outlier alarms, trend slope) to a Graphite Carbon sink. A liveness
//! watchdog per stream raises inactivity alarms when a sensor goes quiet.

use anyhow::Result;
use clap::Parser;
use pulsewatch::connector::{MqttConfig, MqttSource, SourceConnector};
use pulsewatch::{
    AnalyzerConfig, CarbonSink, Metrics, StreamProcessor, WatchdogManager, WindowStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "pulsewatch")]
#[command(version = "0.1.0")]
#[command(about = "Streaming sensor statistics and liveness monitoring", long_about = None)]
struct Cli {
    /// MQTT broker hostname
    #[arg(long, env = "PULSEWATCH_BROKER", default_value = "localhost")]
    broker: String,

    /// MQTT broker port
    #[arg(long, env = "PULSEWATCH_BROKER_PORT", default_value = "1883")]
    broker_port: u16,

    /// MQTT topic filter for sensor readings
    #[arg(long, env = "PULSEWATCH_TOPIC", default_value = "/sensors/#")]
    topic: String,

    /// Carbon plaintext endpoint (host:port)
    #[arg(long, env = "PULSEWATCH_CARBON", default_value = "localhost:2003")]
    carbon: String,

    /// Readings kept per stream window
    #[arg(long, env = "PULSEWATCH_WINDOW_SIZE", default_value = "5")]
    window_size: usize,

    /// Absolute z-score above which a reading is an outlier
    #[arg(long, env = "PULSEWATCH_OUTLIER_THRESHOLD", default_value = "1.0")]
    outlier_threshold: f64,

    /// Seconds between watchdog staleness checks
    #[arg(long, env = "PULSEWATCH_WATCHDOG_INTERVAL", default_value = "20")]
    watchdog_interval_secs: u64,

    /// Seconds of silence before a stream is considered stale
    #[arg(long, env = "PULSEWATCH_STALE_THRESHOLD", default_value = "30")]
    stale_threshold_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    let config = AnalyzerConfig::new()
        .with_window_size(cli.window_size)
        .with_outlier_threshold(cli.outlier_threshold)
        .with_watchdog_interval(Duration::from_secs(cli.watchdog_interval_secs))
        .with_stale_threshold(Duration::from_secs(cli.stale_threshold_secs));

    info!("Pulsewatch starting");
    info!("  Carbon endpoint: {}", cli.carbon);
    info!(
        "  Window size: {}, outlier threshold: {}",
        config.window_size, config.outlier_threshold
    );

    let metrics = Metrics::new();
    let store = Arc::new(WindowStore::new(config.window_size));
    let sink = Arc::new(CarbonSink::new("carbon", &cli.carbon));
    let watchdogs = Arc::new(
        WatchdogManager::new(store.clone(), sink.clone(), config.clone())
            .with_metrics(metrics.clone()),
    );
    let processor = StreamProcessor::new(store, sink, watchdogs.clone(), config)
        .with_metrics(metrics.clone());

    let mqtt_config = MqttConfig::new(&cli.broker, &cli.topic).with_port(cli.broker_port);
    let mut source = MqttSource::new("sensors", mqtt_config);

    let (tx, mut rx) = mpsc::channel(1024);
    source.start(tx).await?;

    loop {
        tokio::select! {
            maybe_reading = rx.recv() => {
                match maybe_reading {
                    Some(reading) => processor.process(reading).await,
                    None => {
                        info!("reading channel closed, shutting down");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down");
                break;
            }
        }
    }

    source.stop().await?;
    watchdogs.stop_all().await;
    info!("Pulsewatch stopped");

    Ok(())
}
