//! SDS011 Collector Binary
//!
//! Samples an SDS011 particulate-matter sensor and prints averaged readings
//! until interrupted.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sds011_collector::{
    Channel, Collector, CollectorConfig, CompositeSink, LineSink, OutputFormat,
    ParticulateDevice, ReadingSink, Sds011, TracingSink, DEFAULT_MEASURE_INTERVAL,
    DEFAULT_NUMBER_OF_MEASUREMENTS, DEFAULT_WARMUP_DELAY,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "sds011_collector")]
#[command(about = "SDS011 particulate matter collector")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Periodically wakes an SDS011 sensor, averages a burst of PM2.5/PM10 readings and publishes them")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Serial device the sensor is attached to
    #[arg(long)]
    device: String,

    /// Display name prefixed to the channel names
    #[arg(short, long)]
    name: Option<String>,

    /// Target period between measurement cycles in seconds
    #[arg(long, default_value_t = DEFAULT_MEASURE_INTERVAL.as_secs())]
    measure_interval: u64,

    /// Sensor warm-up time in seconds; 0 keeps the sensor awake between cycles
    #[arg(long, default_value_t = DEFAULT_WARMUP_DELAY.as_secs())]
    warmup_delay: u64,

    /// Raw samples averaged per cycle
    #[arg(
        long = "measurements",
        default_value_t = DEFAULT_NUMBER_OF_MEASUREMENTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    number_of_measurements: u32,

    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Collect readings until interrupted (default)
    Run,

    /// Take a single raw reading and exit
    Query,
}

impl Cli {
    fn collector_config(&self) -> CollectorConfig {
        CollectorConfig::new(&self.device)
            .with_name(self.name.clone())
            .with_measure_interval(Duration::from_secs(self.measure_interval))
            .with_warmup_delay(Duration::from_secs(self.warmup_delay))
            .with_number_of_measurements(self.number_of_measurements)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    let config = cli.collector_config();
    config.validate()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_command(&cli, config).await,
        Commands::Query => query_command(&cli, config).await,
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

async fn run_command(cli: &Cli, config: CollectorConfig) -> anyhow::Result<()> {
    info!("Starting SDS011 collector on {}", config.device);

    let mut collector = Collector::open(config)
        .await
        .context("failed to initialise sensor")?;

    for channel in collector.channels() {
        info!("Registered channel {} ({}, {})", channel.name, channel.id(), channel.unit);
    }

    let sink = CompositeSink::default()
        .with_sink(Arc::new(TracingSink))
        .with_sink(Arc::new(LineSink::stdout(cli.format)));
    collector.start(Arc::new(sink))?;

    shutdown_signal().await;
    info!("Shutdown requested, stopping collector");

    collector.terminate().await?;
    Ok(())
}

async fn query_command(cli: &Cli, config: CollectorConfig) -> anyhow::Result<()> {
    let mut sensor = Sds011::open(&config.device)
        .await
        .with_context(|| format!("failed to open {}", config.device))?;

    sensor
        .set_power_state(true)
        .await
        .context("failed to wake sensor")?;

    if config.sleep_mode() {
        info!("Warming up sensor for {}s", config.warmup_delay.as_secs());
        tokio::time::sleep(config.warmup_delay).await;
    }

    let result = sensor.query().await;

    if config.sleep_mode() {
        if let Err(e) = sensor.set_power_state(false).await {
            warn!("Failed to put sensor back to sleep: {}", e);
        }
    }

    let sample = result.context("sensor query failed")?;
    let sink = LineSink::stdout(cli.format);
    for channel in Channel::pair(config.name.as_deref()) {
        if let Some(value) = sample.value(channel.kind) {
            sink.publish(&channel, value);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
