//! Per-heater binding: owns the heater collaborator and exactly one active
//! controller, and turns every temperature sample into a power command.

use heatctl_traits::Heater;

use crate::autotune::RelayAutotune;
use crate::controller::Controller;
use crate::error::ControlError;
use crate::hw_error::map_hw_error;
use crate::util::smooth_toward;

/// What happened on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub read_time: f64,
    /// `None` when the temperature could not be read.
    pub temperature: Option<f64>,
    pub target: f64,
    /// Power actually commanded (0 on any fault).
    pub power: f64,
    pub controller: &'static str,
    pub state: Option<&'static str>,
    pub fault: Option<ControlError>,
}

/// A relay experiment temporarily replacing the regular controller.
#[derive(Debug)]
struct CalibrationSlot {
    tuner: RelayAutotune,
    previous_target: f64,
}

pub struct HeaterBinding {
    pub(crate) heater: Box<dyn Heater>,
    pub(crate) controller: Box<dyn Controller>,
    calibration: Option<CalibrationSlot>,
    target: f64,
    max_power: f64,
    smooth_time: f64,
    smoothed_temp: Option<f64>,
    last_read_time: f64,
}

impl core::fmt::Debug for HeaterBinding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HeaterBinding")
            .field("heater", &self.heater.name())
            .field("controller", &self.active().name())
            .field("target", &self.target)
            .field("smoothed_temp", &self.smoothed_temp)
            .finish()
    }
}

impl HeaterBinding {
    pub(crate) fn new(
        heater: Box<dyn Heater>,
        controller: Box<dyn Controller>,
        max_power: f64,
        smooth_time: f64,
    ) -> Self {
        Self {
            heater,
            controller,
            calibration: None,
            target: 0.0,
            max_power,
            smooth_time,
            smoothed_temp: None,
            last_read_time: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        self.heater.name()
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn max_power(&self) -> f64 {
        self.max_power
    }

    pub fn pwm_delay(&self) -> f64 {
        self.heater.pwm_delay()
    }

    pub fn smoothed_temperature(&self) -> Option<f64> {
        self.smoothed_temp
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_some()
    }

    /// The controller currently receiving samples.
    pub fn active(&self) -> &dyn Controller {
        match &self.calibration {
            Some(slot) => &slot.tuner,
            None => self.controller.as_ref(),
        }
    }

    fn active_mut(&mut self) -> &mut dyn Controller {
        match &mut self.calibration {
            Some(slot) => &mut slot.tuner,
            None => self.controller.as_mut(),
        }
    }

    /// Set the setpoint and forward it to the heater collaborator.
    pub fn set_target(&mut self, target: f64) {
        self.target = target;
        self.heater.set_target(target);
    }

    /// Replace the regular controller, returning the old one.
    pub fn install(
        &mut self,
        controller: Box<dyn Controller>,
    ) -> Result<Box<dyn Controller>, ControlError> {
        if self.is_calibrating() {
            return Err(ControlError::State(format!(
                "heater '{}' is calibrating; controller cannot be replaced",
                self.name()
            )));
        }
        tracing::info!(
            heater = self.name(),
            from = self.controller.name(),
            to = controller.name(),
            "controller installed"
        );
        Ok(std::mem::replace(&mut self.controller, controller))
    }

    /// Hand the heater to a relay tuner; the regular controller stays parked
    /// until `end_calibration`.
    pub fn begin_calibration(&mut self, tuner: RelayAutotune) -> Result<(), ControlError> {
        if self.is_calibrating() {
            return Err(ControlError::State(format!(
                "heater '{}' is already calibrating",
                self.name()
            )));
        }
        let previous_target = self.target;
        let target = tuner.settings().target;
        tracing::info!(
            heater = self.name(),
            parked = self.controller.name(),
            target,
            "calibration started"
        );
        self.calibration = Some(CalibrationSlot {
            tuner,
            previous_target,
        });
        self.set_target(target);
        Ok(())
    }

    /// Restore the regular controller and the setpoint it had before
    /// calibration. Returns the tuner with its recorded experiment.
    pub fn end_calibration(&mut self) -> Option<RelayAutotune> {
        let slot = self.calibration.take()?;
        self.set_target(slot.previous_target);
        tracing::info!(
            heater = self.name(),
            restored = self.controller.name(),
            target = slot.previous_target,
            "calibration ended"
        );
        Some(slot.tuner)
    }

    pub fn is_settled(&self, eventtime: f64) -> bool {
        match self.smoothed_temp {
            Some(t) => self.active().is_settled(eventtime, t, self.target),
            None => false,
        }
    }

    /// Read the heater, run the active controller and command the result.
    ///
    /// Never fails: any fault is logged, reported in the outcome and answered
    /// with zero power.
    pub fn tick(&mut self, read_time: f64) -> TickOutcome {
        let status = match self.heater.status(read_time) {
            Ok(s) => s,
            Err(e) => {
                let err = map_hw_error(e.as_ref());
                tracing::error!(heater = self.name(), read_time, error = %err, "heater status unavailable; forcing heater off");
                self.command(read_time, 0.0);
                return self.outcome(read_time, None, 0.0, Some(err));
            }
        };
        if status.max_power.is_finite() && status.max_power > 0.0 {
            self.max_power = status.max_power;
        }
        self.smooth(read_time, status.temperature);

        let target = self.target;
        let (power, fault) = match self
            .active_mut()
            .update(read_time, status.temperature, target)
        {
            Ok(tick) => {
                if let Some(t) = tick.retarget {
                    self.set_target(t);
                }
                if tick.power.is_finite() {
                    (tick.power.clamp(0.0, self.max_power), None)
                } else {
                    (0.0, Some(ControlError::NumericInstability { stage: "output" }))
                }
            }
            Err(e) => (0.0, Some(e)),
        };
        if let Some(e) = &fault {
            tracing::error!(heater = self.name(), read_time, controller = self.active().name(), error = %e, "control tick aborted; forcing heater off");
        }
        self.command(read_time, power);
        tracing::trace!(
            heater = self.name(),
            read_time,
            temp = status.temperature,
            target = self.target,
            power,
            "tick"
        );
        self.outcome(read_time, Some(status.temperature), power, fault)
    }

    fn smooth(&mut self, read_time: f64, temp: f64) {
        if !temp.is_finite() {
            return;
        }
        self.smoothed_temp = Some(match self.smoothed_temp {
            Some(s) => smooth_toward(s, temp, read_time - self.last_read_time, self.smooth_time),
            None => temp,
        });
        self.last_read_time = read_time;
    }

    fn command(&mut self, read_time: f64, power: f64) {
        if let Err(e) = self.heater.set_power(read_time, power) {
            tracing::warn!(heater = self.name(), read_time, power, error = %e, "set_power failed");
        }
    }

    fn outcome(
        &self,
        read_time: f64,
        temperature: Option<f64>,
        power: f64,
        fault: Option<ControlError>,
    ) -> TickOutcome {
        TickOutcome {
            read_time,
            temperature,
            target: self.target,
            power,
            controller: self.active().name(),
            state: self.active().state_name(),
            fault,
        }
    }
}
