//! Traits at the device and host boundaries of the collector.

use crate::error::DeviceError;
use crate::sensor::data::{Channel, RawSample};
use std::future::Future;

/// A particulate-matter sensor driven by the collector.
///
/// The collector owns its device exclusively and awaits every call to
/// completion, so implementations never see a call dropped halfway.
pub trait ParticulateDevice: Send + 'static {
    /// Enter (`false`) or leave (`true`) the low-power idle mode.
    fn set_power_state(
        &mut self,
        active: bool,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Perform one read cycle against the hardware.
    ///
    /// Implementations must not retry internally; a failure is reported as is.
    fn query(&mut self) -> impl Future<Output = Result<RawSample, DeviceError>> + Send;
}

/// Receiver of published readings, implemented by the host.
///
/// Publishing is fire-and-forget: sinks handle and report their own failures.
pub trait ReadingSink: Send + Sync {
    fn publish(&self, channel: &Channel, value: f64);
}
