//! Type-state builder for `HeaterBinding` and config-driven constructors.
//!
//! The builder enforces at compile time that a heater and a controller are
//! provided before `build()` is available. `try_build()` is always available
//! for dynamic checks.

use std::marker::PhantomData;

use heatctl_traits::Heater;

use crate::binding::HeaterBinding;
use crate::config::{FeedforwardCfg, PidCfg, StagedCfg};
use crate::controller::Controller;
use crate::error::{BuildError, Result};
use crate::feedforward::Disturbances;
use crate::pid::PidController;
use crate::staged::StagedController;

pub struct Missing;
pub struct Set;

pub struct BindingBuilder<H, C> {
    heater: Option<Box<dyn Heater>>,
    controller: Option<Box<dyn Controller>>,
    max_power: Option<f64>,
    smooth_time: Option<f64>,
    initial_target: Option<f64>,
    _h: PhantomData<H>,
    _c: PhantomData<C>,
}

impl Default for BindingBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            heater: None,
            controller: None,
            max_power: None,
            smooth_time: None,
            initial_target: None,
            _h: PhantomData,
            _c: PhantomData,
        }
    }
}

impl HeaterBinding {
    pub fn builder() -> BindingBuilder<Missing, Missing> {
        BindingBuilder::default()
    }
}

impl<H, C> BindingBuilder<H, C> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<HeaterBinding> {
        let heater = self
            .heater
            .ok_or_else(|| eyre::Report::new(BuildError::MissingHeater))?;
        let controller = self
            .controller
            .ok_or_else(|| eyre::Report::new(BuildError::MissingController))?;
        let max_power = self.max_power.unwrap_or(1.0);
        if !(max_power > 0.0 && max_power <= 1.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "max_power must be in (0.0, 1.0]",
            )));
        }
        let smooth_time = self.smooth_time.unwrap_or(1.0);
        if !(smooth_time.is_finite() && smooth_time >= 0.0) {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "smooth_time must be a finite value >= 0",
            )));
        }
        let mut binding = HeaterBinding::new(heater, controller, max_power, smooth_time);
        if let Some(t) = self.initial_target {
            binding.set_target(t);
        }
        Ok(binding)
    }

    pub fn with_max_power(mut self, max_power: f64) -> Self {
        self.max_power = Some(max_power);
        self
    }

    pub fn with_smooth_time(mut self, smooth_time: f64) -> Self {
        self.smooth_time = Some(smooth_time);
        self
    }

    pub fn with_target(mut self, target: f64) -> Self {
        self.initial_target = Some(target);
        self
    }
}

impl<C> BindingBuilder<Missing, C> {
    pub fn with_heater(self, heater: impl Heater + 'static) -> BindingBuilder<Set, C> {
        self.with_boxed_heater(Box::new(heater))
    }

    pub fn with_boxed_heater(self, heater: Box<dyn Heater>) -> BindingBuilder<Set, C> {
        BindingBuilder {
            heater: Some(heater),
            controller: self.controller,
            max_power: self.max_power,
            smooth_time: self.smooth_time,
            initial_target: self.initial_target,
            _h: PhantomData,
            _c: PhantomData,
        }
    }
}

impl<H> BindingBuilder<H, Missing> {
    pub fn with_controller(self, controller: Box<dyn Controller>) -> BindingBuilder<H, Set> {
        BindingBuilder {
            heater: self.heater,
            controller: Some(controller),
            max_power: self.max_power,
            smooth_time: self.smooth_time,
            initial_target: self.initial_target,
            _h: PhantomData,
            _c: PhantomData,
        }
    }
}

impl BindingBuilder<Set, Set> {
    pub fn build(self) -> Result<HeaterBinding> {
        self.try_build()
    }
}

/// Construct the controller a heater config selects, with any persisted
/// calibration folded in.
pub fn build_controller(
    cfg: &heatctl_config::HeaterCfg,
    disturbances: Disturbances,
) -> Result<Box<dyn Controller>> {
    let cfg = cfg.with_calibration_applied();
    let pid = PidCfg::from(&cfg.pid);
    if !(pid.min_deriv_time > 0.0) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "pid.deriv_time must be > 0",
        )));
    }
    let controller: Box<dyn Controller> = match cfg.control {
        heatctl_config::ControlMode::Pid => Box::new(PidController::new(pid, cfg.max_power)),
        heatctl_config::ControlMode::Staged => {
            let ff = FeedforwardCfg::from(&cfg.feedforward);
            if !(ff.ev_smoothing > 0.0 && ff.ev_smoothing <= 1.0) {
                return Err(eyre::Report::new(BuildError::InvalidConfig(
                    "feedforward.ev_smoothing must be in (0.0, 1.0]",
                )));
            }
            Box::new(StagedController::new(
                StagedCfg::from(&cfg),
                pid,
                ff,
                disturbances,
                cfg.max_power,
            ))
        }
    };
    tracing::debug!(
        heater = %cfg.name,
        controller = controller.name(),
        calibrated = cfg.calibration.is_some(),
        "controller built"
    );
    Ok(controller)
}

/// Bind a heater collaborator to the controller its config selects.
pub fn bind_heater(
    cfg: &heatctl_config::HeaterCfg,
    heater: Box<dyn Heater>,
    disturbances: Disturbances,
) -> Result<HeaterBinding> {
    HeaterBinding::builder()
        .with_boxed_heater(heater)
        .with_controller(build_controller(cfg, disturbances)?)
        .with_max_power(cfg.max_power)
        .with_smooth_time(cfg.smooth_time)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{FakeHeater, FixedPower};

    fn heater_cfg(extra: &str) -> heatctl_config::HeaterCfg {
        toml::from_str(&format!("name = \"extruder\"\n{extra}")).unwrap()
    }

    #[test]
    fn staged_is_the_default_controller() {
        let c = build_controller(&heater_cfg(""), Disturbances::default()).unwrap();
        assert_eq!(c.name(), "staged");
    }

    #[test]
    fn pid_mode_builds_standalone_pid() {
        let c = build_controller(&heater_cfg("control = \"pid\""), Disturbances::default())
            .unwrap();
        assert_eq!(c.name(), "pid");
    }

    #[test]
    fn try_build_reports_missing_controller() {
        let err = HeaterBinding::builder()
            .with_heater(FakeHeater::new("bed", 20.0))
            .try_build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingController)
        ));
    }

    #[test]
    fn build_rejects_out_of_range_max_power() {
        let err = HeaterBinding::builder()
            .with_heater(FakeHeater::new("bed", 20.0))
            .with_controller(Box::new(FixedPower::new(0.0)))
            .with_max_power(1.5)
            .build()
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::InvalidConfig(_))
        ));
    }

    #[test]
    fn initial_target_reaches_heater() {
        let heater = FakeHeater::new("bed", 20.0);
        let log = heater.log();
        let b = HeaterBinding::builder()
            .with_heater(heater)
            .with_controller(Box::new(FixedPower::new(0.0)))
            .with_target(60.0)
            .build()
            .unwrap();
        assert_eq!(b.target(), 60.0);
        assert_eq!(log.borrow().targets, vec![60.0]);
    }
}
