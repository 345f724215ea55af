//! The control-algorithm seam shared by every strategy a heater can run.

use crate::error::ControlError;

/// Result of one controller update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlTick {
    /// Requested actuation; the binding bounds it to `[0, max_power]`.
    pub power: f64,
    /// New setpoint to push to the heater collaborator, if the strategy moved it.
    pub retarget: Option<f64>,
}

impl ControlTick {
    pub fn power(power: f64) -> Self {
        Self {
            power,
            retarget: None,
        }
    }
}

/// A control strategy driven once per temperature sample.
///
/// Implementations own their internal state; the binding guarantees that
/// exactly one controller is active per heater.
pub trait Controller {
    fn name(&self) -> &'static str;

    fn update(
        &mut self,
        read_time: f64,
        temp: f64,
        target_temp: f64,
    ) -> Result<ControlTick, ControlError>;

    /// True once the heater holds `target_temp` closely enough to be
    /// considered done (for a tuner: once the experiment is complete).
    fn is_settled(&self, eventtime: f64, smoothed_temp: f64, target_temp: f64) -> bool;

    /// Name of the internal state, for strategies that have one.
    fn state_name(&self) -> Option<&'static str> {
        None
    }
}

impl core::fmt::Debug for dyn Controller {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name())
            .finish()
    }
}
