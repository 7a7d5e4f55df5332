//! # SDS011 Collector - Particulate Matter Sampling
//!
//! A small Rust crate that samples a Nova Fitness SDS011 particulate-matter
//! sensor over a serial link and publishes stable PM2.5/PM10 averages.
//!
//! ## Features
//!
//! - **Duty cycling**: the sensor's fan and laser sleep between cycles when a warm-up delay is set
//! - **Robust averaging**: bursts of raw queries averaged per channel, tolerating failed reads
//! - **Self-pacing**: each cycle waits out only what is left of the measure interval
//! - **Deterministic shutdown**: cancellation interrupts every wait, `terminate` joins the worker
//! - **Library + Binary**: embed the collector with your own sink or run the CLI
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sds011_collector::{Collector, CollectorConfig, TracingSink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CollectorConfig::new("/dev/ttyUSB0").with_name(Some("Living Room".into()));
//!     let mut collector = Collector::open(config).await?;
//!
//!     collector.start(Arc::new(TracingSink))?;
//!     tokio::signal::ctrl_c().await?;
//!     collector.terminate().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod sensor;

// Re-export public API
pub use config::CollectorConfig;
pub use error::{CollectorError, DeviceError, Result};
pub use sensor::{
    collector::{pause, remaining_interval, Collector, CyclePhase, Lifecycle, SAMPLE_SPACING},
    data::{aggregate, round_to_tenth, AggregatedReading, Channel, ChannelKind, RawSample, UNIT},
    sds011::{Command, Sds011},
    sink::{CompositeSink, LineSink, OutputFormat, TracingSink},
    traits::{ParticulateDevice, ReadingSink},
};

#[cfg(feature = "serial")]
pub use sensor::sds011::SerialSds011;

use std::time::Duration;

/// Default target period between the starts of two cycles
pub const DEFAULT_MEASURE_INTERVAL: Duration = Duration::from_secs(60);

/// Default time the sensor is given to stabilise after waking
pub const DEFAULT_WARMUP_DELAY: Duration = Duration::from_secs(15);

/// Default number of raw samples averaged per cycle
pub const DEFAULT_NUMBER_OF_MEASUREMENTS: u32 = 5;
