//! Positional PID with a filtered derivative and conditional integration.

use crate::config::{PidCfg, PidGains};
use crate::controller::{ControlTick, Controller};
use crate::error::ControlError;
use crate::util::{filtered_derivative, within_settle_band};

/// Temperature assumed before the first sample arrives.
pub const AMBIENT_TEMP: f64 = 25.0;

/// One PID evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidOutput {
    /// Unbounded controller output.
    pub raw: f64,
    /// `raw` clamped to `[0, max_power]`.
    pub bounded: f64,
}

/// PID computation reused by the standalone PID controller and by the
/// staged controller's Regulate state.
#[derive(Debug, Clone)]
pub struct PidBlock {
    gains: PidGains,
    max_power: f64,
    min_deriv_time: f64,
    integ_max: f64,
    prev_temp: f64,
    prev_time: f64,
    prev_deriv: f64,
    integrator: f64,
}

impl PidBlock {
    pub fn new(cfg: PidCfg, max_power: f64) -> Self {
        let integ_max = if cfg.gains.ki > 0.0 {
            max_power / cfg.gains.ki
        } else {
            0.0
        };
        Self {
            gains: cfg.gains,
            max_power,
            min_deriv_time: cfg.min_deriv_time,
            integ_max,
            prev_temp: AMBIENT_TEMP,
            prev_time: 0.0,
            prev_deriv: 0.0,
            integrator: 0.0,
        }
    }

    /// Evaluate the PID for one sample.
    ///
    /// The integrator is clamped to `[0, max_power / ki]` and only committed
    /// when the raw output was not saturated. State is left untouched when
    /// the output is non-finite.
    pub fn update(
        &mut self,
        read_time: f64,
        temp: f64,
        target_temp: f64,
    ) -> Result<PidOutput, ControlError> {
        let time_diff = read_time - self.prev_time;
        let temp_diff = temp - self.prev_temp;
        let deriv = filtered_derivative(
            self.prev_deriv,
            temp_diff,
            time_diff,
            self.min_deriv_time,
        );
        let err = target_temp - temp;
        let integ = (self.integrator + err * time_diff).clamp(0.0, self.integ_max);
        let raw = self.gains.kp * err + self.gains.ki * integ - self.gains.kd * deriv;
        if !raw.is_finite() || !deriv.is_finite() {
            return Err(ControlError::NumericInstability { stage: "pid" });
        }
        let bounded = raw.clamp(0.0, self.max_power);
        tracing::trace!(read_time, temp, target_temp, raw, bounded, deriv, "pid");

        self.prev_temp = temp;
        self.prev_time = read_time;
        self.prev_deriv = deriv;
        if raw == bounded {
            self.integrator = integ;
        }
        Ok(PidOutput { raw, bounded })
    }

    pub fn reset_integrator(&mut self) {
        self.integrator = 0.0;
    }

    pub fn integrator(&self) -> f64 {
        self.integrator
    }

    pub fn derivative(&self) -> f64 {
        self.prev_deriv
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn max_power(&self) -> f64 {
        self.max_power
    }
}

/// Classic PID heater control with the shared settle rule.
#[derive(Debug, Clone)]
pub struct PidController {
    block: PidBlock,
}

impl PidController {
    pub fn new(cfg: PidCfg, max_power: f64) -> Self {
        Self {
            block: PidBlock::new(cfg, max_power),
        }
    }

    pub fn block(&self) -> &PidBlock {
        &self.block
    }
}

impl Controller for PidController {
    fn name(&self) -> &'static str {
        "pid"
    }

    fn update(
        &mut self,
        read_time: f64,
        temp: f64,
        target_temp: f64,
    ) -> Result<ControlTick, ControlError> {
        let out = self.block.update(read_time, temp, target_temp)?;
        Ok(ControlTick::power(out.bounded))
    }

    fn is_settled(&self, _eventtime: f64, smoothed_temp: f64, target_temp: f64) -> bool {
        within_settle_band(smoothed_temp, target_temp, self.block.derivative())
    }
}
