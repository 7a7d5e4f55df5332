//! Data structures for particulate readings and their aggregation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit shared by both channels.
pub const UNIT: &str = "µg/m³";

/// The quantities measured by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Particles up to 2.5µm
    Pm25,
    /// Particles up to 10µm
    Pm10,
}

impl ChannelKind {
    /// Both channels, in publish order.
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Pm25, ChannelKind::Pm10];

    /// Host-visible label.
    pub fn label(self) -> &'static str {
        match self {
            ChannelKind::Pm25 => "PM2.5",
            ChannelKind::Pm10 => "PM10",
        }
    }

    /// Stable identifier.
    pub fn id(self) -> &'static str {
        match self {
            ChannelKind::Pm25 => "pm25",
            ChannelKind::Pm10 => "pm10",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A measured quantity as registered with the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    /// Which quantity this channel carries
    pub kind: ChannelKind,
    /// Display name, e.g. "Living Room PM2.5"
    pub name: String,
    /// Physical unit
    pub unit: &'static str,
}

impl Channel {
    /// Create a channel, prefixing the label with the configured name if any.
    pub fn new(name: Option<&str>, kind: ChannelKind) -> Self {
        let name = match name.map(str::trim) {
            Some(prefix) if !prefix.is_empty() => format!("{} {}", prefix, kind.label()),
            _ => kind.label().to_string(),
        };
        Self {
            kind,
            name,
            unit: UNIT,
        }
    }

    /// The fixed pair of channels for a device.
    pub fn pair(name: Option<&str>) -> [Channel; 2] {
        ChannelKind::ALL.map(|kind| Channel::new(name, kind))
    }

    /// Stable identifier.
    pub fn id(&self) -> &'static str {
        self.kind.id()
    }
}

/// One untreated reading from a single device query.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RawSample {
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
}

impl RawSample {
    /// A sample where the query produced no data.
    pub const MISSING: RawSample = RawSample {
        pm25: None,
        pm10: None,
    };

    /// Create a sample with both values present.
    pub fn new(pm25: f64, pm10: f64) -> Self {
        Self {
            pm25: Some(pm25),
            pm10: Some(pm10),
        }
    }

    /// Value for one channel.
    pub fn value(&self, kind: ChannelKind) -> Option<f64> {
        match kind {
            ChannelKind::Pm25 => self.pm25,
            ChannelKind::Pm10 => self.pm10,
        }
    }

    /// Whether every channel is absent.
    pub fn is_missing(&self) -> bool {
        self.pm25.is_none() && self.pm10.is_none()
    }
}

/// Averaged values of one cycle. `None` means no sample carried that channel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedReading {
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
}

impl AggregatedReading {
    /// Value for one channel.
    pub fn value(&self, kind: ChannelKind) -> Option<f64> {
        match kind {
            ChannelKind::Pm25 => self.pm25,
            ChannelKind::Pm10 => self.pm10,
        }
    }

    /// Present values in channel order.
    pub fn present(&self) -> impl Iterator<Item = (ChannelKind, f64)> + '_ {
        ChannelKind::ALL
            .into_iter()
            .filter_map(move |kind| self.value(kind).map(|value| (kind, value)))
    }
}

/// Average each channel over the samples, ignoring missing entries.
pub fn aggregate(samples: &[RawSample]) -> AggregatedReading {
    AggregatedReading {
        pm25: mean(samples.iter().filter_map(|s| s.pm25)),
        pm10: mean(samples.iter().filter_map(|s| s.pm10)),
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / f64::from(count))
}

/// Round to one decimal place for publishing.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
