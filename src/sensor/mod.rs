//! Particulate-matter sensing: device access, aggregation and the collection loop.
//!
//! This module holds the duty-cycled collector that drives an SDS011 sensor,
//! the pure aggregation of raw samples into averaged readings, and the sinks
//! that hand those readings to the host.

pub mod collector;
pub mod data;
pub mod sds011;
pub mod sink;
pub mod traits;

// Re-export commonly used items
pub use collector::{Collector, Lifecycle};
pub use data::{aggregate, AggregatedReading, Channel, ChannelKind, RawSample};
pub use traits::{ParticulateDevice, ReadingSink};
