//! Duty-cycled collection loop for a particulate-matter sensor.

use crate::config::CollectorConfig;
use crate::error::{CollectorError, Result};
use crate::sensor::{
    data::{aggregate, round_to_tenth, AggregatedReading, Channel, RawSample},
    traits::{ParticulateDevice, ReadingSink},
};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[cfg(feature = "serial")]
use crate::sensor::sds011::{SerialSds011, Sds011};

/// Pause between two queries of the same burst.
pub const SAMPLE_SPACING: Duration = Duration::from_secs(1);

/// Lifecycle of a [`Collector`] as seen by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, worker not spawned yet
    Idle,
    /// Worker loop active
    Running,
    /// Worker exited and device released
    Terminated,
}

/// Step of a single collection cycle, as reported by [`Collector::phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    WakingUp,
    Sampling,
    Aggregating,
    Publishing,
    PoweringDown,
    Idling,
}

enum State<D> {
    Idle(D),
    Running(JoinHandle<()>),
    Terminated,
}

/// Owns a particulate sensor and publishes averaged readings on a fixed cadence.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use sds011_collector::{Collector, CollectorConfig, TracingSink};
///
/// # async fn run() -> sds011_collector::Result<()> {
/// let mut collector = Collector::open(CollectorConfig::new("/dev/ttyUSB0")).await?;
/// for channel in collector.channels() {
///     println!("registered {} ({})", channel.name, channel.unit);
/// }
/// collector.start(Arc::new(TracingSink))?;
/// tokio::signal::ctrl_c().await.ok();
/// collector.terminate().await?;
/// # Ok(())
/// # }
/// ```
pub struct Collector<D: ParticulateDevice> {
    config: Arc<CollectorConfig>,
    channels: [Channel; 2],
    cancel: CancellationToken,
    phase: Option<watch::Receiver<CyclePhase>>,
    state: State<D>,
}

impl<D: ParticulateDevice> Collector<D> {
    /// Take ownership of a device and put it into its initial power state.
    ///
    /// In sleep mode (non-zero warm-up) the device is powered down until the
    /// first cycle, otherwise it is kept active for good.
    pub async fn new(config: CollectorConfig, mut device: D) -> Result<Self> {
        config.validate()?;

        info!("measure_interval: {}s", config.measure_interval.as_secs_f64());
        info!("warmup_delay: {}s", config.warmup_delay.as_secs_f64());

        let active = !config.sleep_mode();
        device.set_power_state(active).await.map_err(|e| {
            CollectorError::device_open_error(format!(
                "failed to set initial power state of {}: {}",
                config.device, e
            ))
        })?;

        let channels = Channel::pair(config.name.as_deref());

        Ok(Self {
            config: Arc::new(config),
            channels,
            cancel: CancellationToken::new(),
            phase: None,
            state: State::Idle(device),
        })
    }

    /// Channel descriptors to register with the host before [`start`](Self::start).
    pub fn channels(&self) -> &[Channel; 2] {
        &self.channels
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match self.state {
            State::Idle(_) => Lifecycle::Idle,
            State::Running(_) => Lifecycle::Running,
            State::Terminated => Lifecycle::Terminated,
        }
    }

    /// Current step of the worker, `None` unless running.
    pub fn phase(&self) -> Option<CyclePhase> {
        match self.state {
            State::Running(_) => self.phase.as_ref().map(|rx| *rx.borrow()),
            State::Idle(_) | State::Terminated => None,
        }
    }

    /// Spawn the background worker. Only valid once, from [`Lifecycle::Idle`].
    pub fn start(&mut self, sink: Arc<dyn ReadingSink>) -> Result<()> {
        let lifecycle = self.lifecycle();
        let device = match std::mem::replace(&mut self.state, State::Terminated) {
            State::Idle(device) => device,
            other => {
                self.state = other;
                return Err(CollectorError::invalid_state(format!(
                    "cannot start a collector in state {:?}",
                    lifecycle
                )));
            }
        };

        let (phase_tx, phase_rx) = watch::channel(CyclePhase::Idling);
        self.phase = Some(phase_rx);

        let worker = Worker {
            device,
            config: Arc::clone(&self.config),
            channels: self.channels.clone(),
            sink,
            cancel: self.cancel.clone(),
            phase: phase_tx,
            cycle: 0,
        };

        self.state = State::Running(tokio::spawn(worker.run()));
        info!(device = %self.config.device, "Collector started");
        Ok(())
    }

    /// Request cancellation and wait for the worker to exit.
    ///
    /// Returns once the worker has released the device, after at most one
    /// in-flight device call. A sensor interrupted mid-cycle is left awake until
    /// the next [`Collector::new`] sets its power state. Calling it again, or on
    /// a collector that never started, is a no-op.
    pub async fn terminate(&mut self) -> Result<()> {
        self.cancel.cancel();
        match std::mem::replace(&mut self.state, State::Terminated) {
            State::Running(handle) => handle
                .await
                .map_err(|e| CollectorError::worker_error(format!("collector worker failed: {}", e))),
            State::Idle(_) | State::Terminated => Ok(()),
        }
    }
}

#[cfg(feature = "serial")]
impl Collector<SerialSds011> {
    /// Open the SDS011 at `config.device` and take ownership of it.
    pub async fn open(config: CollectorConfig) -> Result<Self> {
        config.validate()?;
        let device = Sds011::open(&config.device)
            .await
            .map_err(|e| CollectorError::device_open_error(e.to_string()))?;
        Self::new(config, device).await
    }
}

impl<D: ParticulateDevice> Drop for Collector<D> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Wait for `duration` unless cancellation is requested first.
///
/// Returns `Break` as soon as `cancel` fires, `Continue` after the full duration.
pub async fn pause(cancel: &CancellationToken, duration: Duration) -> ControlFlow<()> {
    if duration.is_zero() {
        // Still a scheduling point, so a worker with zero waits cannot starve its owner.
        tokio::task::yield_now().await;
        return if cancel.is_cancelled() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        };
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => ControlFlow::Break(()),
        _ = time::sleep(duration) => ControlFlow::Continue(()),
    }
}

/// Time left in the current cycle; zero once the work has overrun the interval.
pub fn remaining_interval(measure_interval: Duration, elapsed: Duration) -> Duration {
    measure_interval.saturating_sub(elapsed)
}

#[derive(Debug)]
struct CycleReport {
    attempted: u32,
    missing: u32,
    reading: AggregatedReading,
    elapsed: Duration,
}

struct Worker<D> {
    device: D,
    config: Arc<CollectorConfig>,
    channels: [Channel; 2],
    sink: Arc<dyn ReadingSink>,
    cancel: CancellationToken,
    phase: watch::Sender<CyclePhase>,
    cycle: u64,
}

impl<D: ParticulateDevice> Worker<D> {
    async fn run(mut self) {
        debug!("Collector worker started");

        while !self.cancel.is_cancelled() {
            self.cycle += 1;
            let ControlFlow::Continue(report) = self.run_cycle().await else {
                break;
            };
            debug!(
                cycle = self.cycle,
                attempted = report.attempted,
                missing = report.missing,
                pm25 = ?report.reading.pm25,
                pm10 = ?report.reading.pm10,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "cycle complete"
            );

            self.enter(CyclePhase::Idling);
            let wait = remaining_interval(self.config.measure_interval, report.elapsed);
            if pause(&self.cancel, wait).await.is_break() {
                break;
            }
        }

        info!("Collector worker finished");
    }

    async fn run_cycle(&mut self) -> ControlFlow<(), CycleReport> {
        let started = Instant::now();
        let sleep_mode = self.config.sleep_mode();

        if sleep_mode {
            self.enter(CyclePhase::WakingUp);
            debug!("Warming up sensor, delay: {:?}", self.config.warmup_delay);
            self.power(true).await;
            pause(&self.cancel, self.config.warmup_delay).await?;
        }

        self.enter(CyclePhase::Sampling);
        let samples = self.sample_burst().await?;

        self.enter(CyclePhase::Aggregating);
        let reading = aggregate(&samples);

        self.enter(CyclePhase::Publishing);
        self.publish(&reading);

        if sleep_mode {
            self.enter(CyclePhase::PoweringDown);
            self.power(false).await;
        }

        ControlFlow::Continue(CycleReport {
            attempted: samples.len() as u32,
            missing: samples.iter().filter(|s| s.is_missing()).count() as u32,
            reading,
            elapsed: started.elapsed(),
        })
    }

    /// Query the device `number_of_measurements` times, one second apart.
    ///
    /// A failed query counts as a missing sample and sampling carries on.
    async fn sample_burst(&mut self) -> ControlFlow<(), Vec<RawSample>> {
        let count = self.config.number_of_measurements;
        let mut samples = Vec::with_capacity(count as usize);

        for index in 0..count {
            if index > 0 {
                pause(&self.cancel, SAMPLE_SPACING).await?;
            }

            let sample = match self.device.query().await {
                Ok(sample) => sample,
                Err(err) => {
                    warn!(
                        cycle = self.cycle,
                        sample = index + 1,
                        error = %err,
                        "Sensor query failed, sample treated as missing"
                    );
                    RawSample::MISSING
                }
            };
            trace!(sample = index + 1, ?sample, "raw sample");
            samples.push(sample);
        }

        ControlFlow::Continue(samples)
    }

    fn publish(&self, reading: &AggregatedReading) {
        for channel in &self.channels {
            match reading.value(channel.kind) {
                Some(value) => self.sink.publish(channel, round_to_tenth(value)),
                None => debug!(
                    channel = channel.id(),
                    "No valid samples this cycle, keeping last published value"
                ),
            }
        }
    }

    async fn power(&mut self, active: bool) {
        if let Err(err) = self.device.set_power_state(active).await {
            warn!(active, error = %err, "Failed to change sensor power state");
        }
    }

    fn enter(&self, phase: CyclePhase) {
        self.phase.send_replace(phase);
        trace!(cycle = self.cycle, ?phase, "cycle phase");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_interval() {
        let interval = Duration::from_secs(10);
        assert_eq!(
            remaining_interval(interval, Duration::from_secs(4)),
            Duration::from_secs(6)
        );
        assert_eq!(remaining_interval(interval, Duration::from_secs(10)), Duration::ZERO);
        assert_eq!(remaining_interval(interval, Duration::from_secs(19)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_runs_full_duration() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        assert!(pause(&cancel, Duration::from_secs(5)).await.is_continue());
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_millis(5_010));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_returns_early_on_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        assert!(pause(&cancel, Duration::from_secs(60)).await.is_break());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_zero_pause_reports_cancellation() {
        let cancel = CancellationToken::new();
        assert!(pause(&cancel, Duration::ZERO).await.is_continue());
        cancel.cancel();
        assert!(pause(&cancel, Duration::ZERO).await.is_break());
    }
}
