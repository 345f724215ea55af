//! Tick scheduling: drives a heater binding at a fixed cadence against an
//! injectable clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use heatctl_traits::clock::Clock;

use crate::binding::{HeaterBinding, TickOutcome};
use crate::error::{AbortReason, ControlError};

/// Blocks the caller until a heater reports settled.
pub trait Scheduler {
    fn wait_settled(&mut self, binding: &mut HeaterBinding) -> Result<(), ControlError>;
}

/// Summary of a fixed-length run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub faults: u64,
    pub elapsed: f64,
    pub final_temperature: Option<f64>,
    pub final_state: Option<&'static str>,
    /// Seconds from the start of the run until the heater first settled.
    pub settled_at: Option<f64>,
    pub settled: bool,
    pub interrupted: bool,
}

/// Ticks every `period` of clock time. With a `VirtualClock` this runs as
/// fast as the plant can be simulated.
pub struct PacedScheduler {
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    period: Duration,
    max_duration: Option<Duration>,
    shutdown: Option<Arc<AtomicBool>>,
}

impl core::fmt::Debug for PacedScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PacedScheduler")
            .field("period", &self.period)
            .field("max_duration", &self.max_duration)
            .field("elapsed", &self.now())
            .finish()
    }
}

impl PacedScheduler {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>, period: Duration) -> Self {
        let epoch = clock.now();
        Self {
            clock,
            epoch,
            period: period.max(Duration::from_millis(1)),
            max_duration: None,
            shutdown: None,
        }
    }

    pub fn with_max_duration(mut self, d: Duration) -> Self {
        self.max_duration = Some(d);
        self
    }

    /// Stop at the next tick once `flag` is set (e.g. from a Ctrl-C handler).
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = Some(flag);
        self
    }

    /// Seconds since the scheduler was created; used as `read_time`.
    pub fn now(&self) -> f64 {
        self.clock.secs_since(self.epoch)
    }

    fn interrupted(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Tick `binding` for `duration`, handing every outcome to `on_tick`.
    pub fn run_for(
        &mut self,
        binding: &mut HeaterBinding,
        duration: Duration,
        mut on_tick: impl FnMut(&TickOutcome),
    ) -> RunSummary {
        let start = self.now();
        let limit = duration.as_secs_f64();
        let mut summary = RunSummary {
            ticks: 0,
            faults: 0,
            elapsed: 0.0,
            final_temperature: None,
            final_state: None,
            settled_at: None,
            settled: false,
            interrupted: false,
        };
        loop {
            if self.interrupted() {
                tracing::warn!(heater = binding.name(), "run interrupted");
                summary.interrupted = true;
                break;
            }
            let now = self.now();
            if now - start >= limit {
                break;
            }
            let outcome = binding.tick(now);
            summary.ticks += 1;
            if outcome.fault.is_some() {
                summary.faults += 1;
            }
            if outcome.temperature.is_some() {
                summary.final_temperature = outcome.temperature;
            }
            summary.final_state = outcome.state;
            if summary.settled_at.is_none() && binding.is_settled(now) {
                summary.settled_at = Some(now - start);
            }
            on_tick(&outcome);
            self.clock.sleep(self.period);
        }
        summary.elapsed = self.now() - start;
        summary.settled = binding.is_settled(self.now());
        tracing::info!(
            heater = binding.name(),
            ticks = summary.ticks,
            faults = summary.faults,
            settled = summary.settled,
            "run finished"
        );
        summary
    }
}

impl Scheduler for PacedScheduler {
    fn wait_settled(&mut self, binding: &mut HeaterBinding) -> Result<(), ControlError> {
        let start = self.now();
        let limit = self.max_duration.map(|d| d.as_secs_f64());
        loop {
            if self.interrupted() {
                return Err(ControlError::Abort(AbortReason::Interrupted));
            }
            let now = self.now();
            if limit.is_some_and(|l| now - start >= l) {
                tracing::warn!(heater = binding.name(), elapsed = now - start, "gave up waiting for heater");
                return Err(ControlError::Abort(AbortReason::Timeout));
            }
            binding.tick(now);
            if binding.is_settled(now) {
                tracing::debug!(heater = binding.name(), elapsed = now - start, "heater settled");
                return Ok(());
            }
            self.clock.sleep(self.period);
        }
    }
}
