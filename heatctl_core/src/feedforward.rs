//! Steady-state feedforward from measured disturbances.

use heatctl_traits::StatusProvider;

use crate::config::{FeedforwardCfg, FeedforwardParams};
use crate::error::ControlError;

/// Nozzle height (mm) below which the first-layer setpoint offset applies.
pub const FIRST_LAYER_HEIGHT: f64 = 0.3;

/// One reading of every disturbance the feedforward term uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisturbanceSample {
    pub fan_speed: f64,
    pub extruder_velocity: f64,
    pub nozzle_height: f64,
}

/// Read-only handles to the disturbance sources of one heater.
///
/// Missing sources read as zero fan speed, zero extruder velocity and an
/// unbounded nozzle height (never the first layer).
#[derive(Default)]
pub struct Disturbances {
    fan: Option<Box<dyn StatusProvider>>,
    extruder_velocity: Option<Box<dyn StatusProvider>>,
    nozzle_height: Option<Box<dyn StatusProvider>>,
}

impl Disturbances {
    pub fn with_fan(mut self, p: impl StatusProvider + 'static) -> Self {
        self.fan = Some(Box::new(p));
        self
    }

    pub fn with_extruder_velocity(mut self, p: impl StatusProvider + 'static) -> Self {
        self.extruder_velocity = Some(Box::new(p));
        self
    }

    pub fn with_nozzle_height(mut self, p: impl StatusProvider + 'static) -> Self {
        self.nozzle_height = Some(Box::new(p));
        self
    }

    pub fn sample(&self, eventtime: f64) -> DisturbanceSample {
        DisturbanceSample {
            fan_speed: self.fan.as_ref().map_or(0.0, |p| p.value(eventtime)),
            extruder_velocity: self
                .extruder_velocity
                .as_ref()
                .map_or(0.0, |p| p.value(eventtime)),
            nozzle_height: self
                .nozzle_height
                .as_ref()
                .map_or(f64::INFINITY, |p| p.value(eventtime)),
        }
    }
}

impl core::fmt::Debug for Disturbances {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Disturbances")
            .field("fan", &self.fan.is_some())
            .field("extruder_velocity", &self.extruder_velocity.is_some())
            .field("nozzle_height", &self.nozzle_height.is_some())
            .finish()
    }
}

/// Feedforward term `u_ff = (T* - dT_layer) * Kss + fan * Kfan + ev_f * Kev`.
#[derive(Debug, Clone)]
pub struct FeedforwardModel {
    params: FeedforwardParams,
    alpha: f64,
    filtered_ev: f64,
}

impl FeedforwardModel {
    pub fn new(cfg: FeedforwardCfg) -> Self {
        Self {
            params: cfg.params,
            alpha: cfg.ev_smoothing,
            filtered_ev: 0.0,
        }
    }

    /// Compute the feedforward actuation and advance the extruder-velocity filter.
    ///
    /// The filter state is only committed when the result is finite.
    pub fn compute(
        &mut self,
        target_temp: f64,
        sample: &DisturbanceSample,
    ) -> Result<f64, ControlError> {
        if sample.fan_speed.is_nan()
            || !sample.extruder_velocity.is_finite()
            || sample.nozzle_height.is_nan()
        {
            return Err(ControlError::NumericInstability {
                stage: "feedforward",
            });
        }
        let ev = ((1.0 - self.alpha) * self.filtered_ev + self.alpha * sample.extruder_velocity)
            .max(0.0);
        let layer_offset = if sample.nozzle_height < FIRST_LAYER_HEIGHT {
            self.params.dt_first_layer
        } else {
            0.0
        };
        let u = (target_temp - layer_offset) * self.params.k_ss
            + sample.fan_speed * self.params.k_fan
            + ev * self.params.k_ev;
        if !u.is_finite() {
            return Err(ControlError::NumericInstability {
                stage: "feedforward",
            });
        }
        self.filtered_ev = ev;
        Ok(u)
    }

    pub fn filtered_extruder_velocity(&self) -> f64 {
        self.filtered_ev
    }

    pub fn params(&self) -> &FeedforwardParams {
        &self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(k_ss: f64, k_fan: f64, k_ev: f64, alpha: f64) -> FeedforwardModel {
        FeedforwardModel::new(FeedforwardCfg {
            params: FeedforwardParams {
                k_ss,
                k_fan,
                k_ev,
                dt_first_layer: 1.5,
            },
            ev_smoothing: alpha,
        })
    }

    fn sample(fan: f64, ev: f64, z: f64) -> DisturbanceSample {
        DisturbanceSample {
            fan_speed: fan,
            extruder_velocity: ev,
            nozzle_height: z,
        }
    }

    #[test]
    fn first_layer_lowers_effective_setpoint() {
        let mut ff = model(0.01, 0.0, 0.0, 0.1);
        let high = ff.compute(200.0, &sample(0.0, 0.0, 5.0)).unwrap();
        let low = ff.compute(200.0, &sample(0.0, 0.0, 0.2)).unwrap();
        assert!((high - 2.0).abs() < 1e-12);
        assert!((low - 1.985).abs() < 1e-12);
    }

    #[test]
    fn extruder_velocity_is_smoothed_and_never_negative() {
        let mut ff = model(0.0, 0.0, 1.0, 0.5);
        let u = ff.compute(200.0, &sample(0.0, 4.0, 5.0)).unwrap();
        assert!((u - 2.0).abs() < 1e-12);
        ff.compute(200.0, &sample(0.0, -100.0, 5.0)).unwrap();
        assert_eq!(ff.filtered_extruder_velocity(), 0.0);
    }

    #[test]
    fn fan_term_is_linear() {
        let mut ff = model(0.0, 0.2, 0.0, 0.1);
        let u = ff.compute(200.0, &sample(0.5, 0.0, 5.0)).unwrap();
        assert!((u - 0.1).abs() < 1e-12);
    }

    #[test]
    fn non_finite_velocity_does_not_poison_filter() {
        let mut ff = model(0.0, 0.0, 1.0, 0.5);
        ff.compute(200.0, &sample(0.0, 2.0, 5.0)).unwrap();
        assert!(ff.compute(200.0, &sample(0.0, f64::NAN, 5.0)).is_err());
        assert!((ff.filtered_extruder_velocity() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_sources_read_as_neutral() {
        let d = Disturbances::default();
        let s = d.sample(1.0);
        assert_eq!(s.fan_speed, 0.0);
        assert_eq!(s.extruder_velocity, 0.0);
        assert!(s.nozzle_height > FIRST_LAYER_HEIGHT);
    }

    #[test]
    fn providers_are_sampled_at_eventtime() {
        let d = Disturbances::default()
            .with_fan(|t: f64| t / 10.0)
            .with_nozzle_height(|_t: f64| 0.2);
        let s = d.sample(5.0);
        assert!((s.fan_speed - 0.5).abs() < 1e-12);
        assert_eq!(s.nozzle_height, 0.2);
    }
}
