//! Ready-made reading sinks.

use crate::sensor::{data::Channel, traits::ReadingSink};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Logs every published reading at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReadingSink for TracingSink {
    fn publish(&self, channel: &Channel, value: f64) {
        info!(channel = channel.id(), "{}: {} {}", channel.name, value, channel.unit);
    }
}

/// Output format for [`LineSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human readable line
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pretty" => Ok(OutputFormat::Pretty),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unsupported format: {}. Use 'json' or 'pretty'", other)),
        }
    }
}

#[derive(Debug, Serialize)]
struct ReadingRecord<'a> {
    timestamp: DateTime<Utc>,
    channel: &'static str,
    name: &'a str,
    value: f64,
    unit: &'static str,
}

/// Writes one line per reading to any writer.
pub struct LineSink<W> {
    writer: Mutex<W>,
    format: OutputFormat,
}

impl LineSink<io::Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer: Mutex::new(writer),
            format,
        }
    }

    /// Recover the writer, e.g. to inspect buffered output.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_reading(&self, channel: &Channel, value: f64) -> io::Result<()> {
        let timestamp = Utc::now();
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match self.format {
            OutputFormat::Pretty => writeln!(
                writer,
                "{} {}: {:.1} {}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                channel.name,
                value,
                channel.unit
            )?,
            OutputFormat::Json => {
                let record = ReadingRecord {
                    timestamp,
                    channel: channel.id(),
                    name: &channel.name,
                    value,
                    unit: channel.unit,
                };
                serde_json::to_writer(&mut *writer, &record)?;
                writeln!(writer)?;
            }
        }
        writer.flush()
    }
}

impl<W: Write + Send> ReadingSink for LineSink<W> {
    fn publish(&self, channel: &Channel, value: f64) {
        if let Err(err) = self.write_reading(channel, value) {
            warn!(channel = channel.id(), error = %err, "Failed to write reading");
        }
    }
}

/// Fans every reading out to several sinks, in order.
#[derive(Clone, Default)]
pub struct CompositeSink {
    sinks: Vec<Arc<dyn ReadingSink>>,
}

impl CompositeSink {
    pub fn new(sinks: Vec<Arc<dyn ReadingSink>>) -> Self {
        Self { sinks }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReadingSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReadingSink for CompositeSink {
    fn publish(&self, channel: &Channel, value: f64) {
        for sink in &self.sinks {
            sink.publish(channel, value);
        }
    }
}
