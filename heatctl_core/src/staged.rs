//! Staged heater control: full power, coast, and feedback plus feedforward
//! regulation near the setpoint.
//!
//! ```text
//!   Off ──error>0──▶ MaxPower ──error<t_overshoot_up──▶ CoastUp
//!                        ▲                                 │ deriv<=0 or timeout
//!                        │ error>band                      ▼
//!                        └───────────────────────────── Regulate ◀──┐
//!                                                          │ error<-band
//!                                                          ▼        │
//!                           CoastDown ◀──error>-t_os_down── MinPower │
//!                               └──── deriv>=0 or timeout ──────────┘
//! ```

use crate::config::{FeedforwardCfg, PidCfg, StagedCfg};
use crate::controller::{ControlTick, Controller};
use crate::error::ControlError;
use crate::feedforward::{Disturbances, FeedforwardModel};
use crate::pid::{AMBIENT_TEMP, PidBlock, PidOutput};
use crate::util::{filtered_derivative, within_settle_band};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Off,
    MaxPower,
    CoastUp,
    Regulate,
    MinPower,
    CoastDown,
}

impl ControlState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlState::Off => "off",
            ControlState::MaxPower => "max_power",
            ControlState::CoastUp => "coast_up",
            ControlState::Regulate => "regulate",
            ControlState::MinPower => "min_power",
            ControlState::CoastDown => "coast_down",
        }
    }

    /// States whose entry clears the PID integrator.
    fn resets_integrator(self) -> bool {
        matches!(
            self,
            ControlState::Off | ControlState::CoastUp | ControlState::CoastDown
        )
    }
}

impl core::fmt::Display for ControlState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable per-heater state of the staged controller.
#[derive(Debug, Clone)]
pub struct ControllerContext {
    pub target_temp: Option<f64>,
    pub prev_temp: f64,
    pub prev_temp_time: f64,
    pub prev_temp_deriv: f64,
    pub state: ControlState,
    /// `NEG_INFINITY` after a forced transition, so dwell gating never blocks.
    pub last_state_change: f64,
}

impl Default for ControllerContext {
    fn default() -> Self {
        Self {
            target_temp: None,
            prev_temp: AMBIENT_TEMP,
            prev_temp_time: 0.0,
            prev_temp_deriv: 0.0,
            state: ControlState::Off,
            last_state_change: 0.0,
        }
    }
}

#[derive(Debug)]
pub struct StagedController {
    cfg: StagedCfg,
    max_power: f64,
    min_deriv_time: f64,
    ctx: ControllerContext,
    pid: PidBlock,
    feedforward: FeedforwardModel,
    disturbances: Disturbances,
}

impl StagedController {
    pub fn new(
        cfg: StagedCfg,
        pid: PidCfg,
        feedforward: FeedforwardCfg,
        disturbances: Disturbances,
        max_power: f64,
    ) -> Self {
        Self {
            cfg,
            max_power,
            min_deriv_time: pid.min_deriv_time,
            ctx: ControllerContext::default(),
            pid: PidBlock::new(pid, max_power),
            feedforward: FeedforwardModel::new(feedforward),
            disturbances,
        }
    }

    pub fn state(&self) -> ControlState {
        self.ctx.state
    }

    pub fn context(&self) -> &ControllerContext {
        &self.ctx
    }

    pub fn pid(&self) -> &PidBlock {
        &self.pid
    }

    pub fn feedforward(&self) -> &FeedforwardModel {
        &self.feedforward
    }

    fn transition(&mut self, next: ControlState, read_time: f64) {
        if self.ctx.state == next {
            return;
        }
        tracing::info!(
            read_time,
            from = %self.ctx.state,
            to = %next,
            "staged controller state change"
        );
        if next.resets_integrator() {
            self.pid.reset_integrator();
        }
        self.ctx.state = next;
        self.ctx.last_state_change = read_time;
    }

    /// A setpoint change while coasting drops straight into Regulate,
    /// bypassing the minimum-dwell gate.
    fn force_regulate(&mut self, read_time: f64) {
        self.transition(ControlState::Regulate, read_time);
        self.ctx.last_state_change = f64::NEG_INFINITY;
    }

    /// Output of the current state, transitioning for the next tick when an
    /// exit condition holds.
    fn step_state(
        &mut self,
        read_time: f64,
        error: f64,
        deriv: f64,
        target_temp: f64,
        fb: Option<PidOutput>,
    ) -> Result<f64, ControlError> {
        let duration = read_time - self.ctx.last_state_change;
        let out = match self.ctx.state {
            ControlState::Off => {
                // A heater at or above its setpoint waits here until it cools.
                if error > 0.0 {
                    self.transition(ControlState::MaxPower, read_time);
                }
                0.0
            }
            ControlState::MaxPower => {
                if error < self.cfg.t_overshoot_up {
                    self.transition(ControlState::CoastUp, read_time);
                }
                self.max_power
            }
            ControlState::CoastUp => {
                if deriv <= 0.0 || duration >= self.cfg.coast_time_up {
                    self.transition(ControlState::Regulate, read_time);
                }
                0.0
            }
            ControlState::Regulate => {
                if error.abs() <= self.cfg.regulation_band || duration < self.cfg.min_duration {
                    self.regulate(read_time, target_temp, fb)?
                } else if error > self.cfg.regulation_band {
                    self.transition(ControlState::MaxPower, read_time);
                    self.max_power
                } else {
                    self.transition(ControlState::MinPower, read_time);
                    0.0
                }
            }
            ControlState::MinPower => {
                if error > -self.cfg.t_overshoot_down {
                    self.transition(ControlState::CoastDown, read_time);
                }
                0.0
            }
            ControlState::CoastDown => {
                if deriv >= 0.0 || duration >= self.cfg.coast_time_down {
                    self.transition(ControlState::Regulate, read_time);
                }
                self.max_power
            }
        };
        Ok(out)
    }

    fn regulate(
        &mut self,
        read_time: f64,
        target_temp: f64,
        fb: Option<PidOutput>,
    ) -> Result<f64, ControlError> {
        let u_fb = fb.map_or(0.0, |o| o.raw.clamp(-self.max_power, self.max_power));
        let sample = self.disturbances.sample(read_time);
        let u_ff = self.feedforward.compute(target_temp, &sample)?;
        tracing::debug!(
            read_time,
            u_fb,
            u_ff,
            fan = sample.fan_speed,
            ev_filtered = self.feedforward.filtered_extruder_velocity(),
            "regulate"
        );
        Ok(u_fb + u_ff)
    }
}

impl Controller for StagedController {
    fn name(&self) -> &'static str {
        "staged"
    }

    fn update(
        &mut self,
        read_time: f64,
        temp: f64,
        target_temp: f64,
    ) -> Result<ControlTick, ControlError> {
        let fb = if self.cfg.fb_enable {
            Some(self.pid.update(read_time, temp, target_temp)?)
        } else {
            None
        };

        let target_changed = self.ctx.target_temp.is_some_and(|t| t != target_temp);
        self.ctx.target_temp = Some(target_temp);

        let deriv = filtered_derivative(
            self.ctx.prev_temp_deriv,
            temp - self.ctx.prev_temp,
            read_time - self.ctx.prev_temp_time,
            self.min_deriv_time,
        );
        if !deriv.is_finite() {
            return Err(ControlError::NumericInstability { stage: "derivative" });
        }

        let out = if target_temp <= 0.0 {
            self.transition(ControlState::Off, read_time);
            0.0
        } else {
            if target_changed
                && matches!(
                    self.ctx.state,
                    ControlState::CoastUp | ControlState::CoastDown
                )
            {
                self.force_regulate(read_time);
            }
            self.step_state(read_time, target_temp - temp, deriv, target_temp, fb)?
        };
        if !out.is_finite() {
            return Err(ControlError::NumericInstability { stage: "output" });
        }

        self.ctx.prev_temp = temp;
        self.ctx.prev_temp_time = read_time;
        self.ctx.prev_temp_deriv = deriv;
        Ok(ControlTick::power(out.clamp(0.0, self.max_power)))
    }

    fn is_settled(&self, _eventtime: f64, smoothed_temp: f64, target_temp: f64) -> bool {
        within_settle_band(smoothed_temp, target_temp, self.ctx.prev_temp_deriv)
    }

    fn state_name(&self) -> Option<&'static str> {
        Some(self.ctx.state.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeedforwardParams, PidGains};

    fn staged_cfg() -> StagedCfg {
        StagedCfg {
            t_overshoot_up: 3.0,
            coast_time_up: 10.0,
            t_overshoot_down: 3.0,
            coast_time_down: 10.0,
            regulation_band: 5.0,
            min_duration: 5.0,
            fb_enable: true,
        }
    }

    fn controller(cfg: StagedCfg, k_ss: f64) -> StagedController {
        StagedController::new(
            cfg,
            PidCfg {
                gains: PidGains {
                    kp: 0.05,
                    ki: 0.001,
                    kd: 0.0,
                },
                min_deriv_time: 2.0,
            },
            FeedforwardCfg {
                params: FeedforwardParams {
                    k_ss,
                    ..FeedforwardParams::default()
                },
                ev_smoothing: 0.1,
            },
            Disturbances::default(),
            1.0,
        )
    }

    #[test]
    fn zero_target_forces_off_and_zero_power() {
        let mut c = controller(staged_cfg(), 0.0);
        let tick = c.update(1.0, 25.0, 0.0).unwrap();
        assert_eq!(tick.power, 0.0);
        assert_eq!(c.state(), ControlState::Off);
    }

    #[test]
    fn cold_start_heats_at_full_power() {
        let mut c = controller(staged_cfg(), 0.0);
        assert_eq!(c.update(0.5, 25.0, 200.0).unwrap().power, 0.0);
        assert_eq!(c.state(), ControlState::MaxPower);
        assert_eq!(c.update(1.0, 26.0, 200.0).unwrap().power, 1.0);
    }

    #[test]
    fn off_above_target_stays_off_without_power() {
        let mut cfg = staged_cfg();
        cfg.fb_enable = false;
        let mut c = controller(cfg, 0.0035);
        assert_eq!(c.update(0.5, 260.0, 200.0).unwrap().power, 0.0);
        assert_eq!(c.update(1.0, 260.0, 200.0).unwrap().power, 0.0);
        assert_eq!(c.state(), ControlState::Off);
        // once it has cooled below target the normal heat-up path starts
        c.update(1.5, 190.0, 200.0).unwrap();
        assert_eq!(c.state(), ControlState::MaxPower);
    }

    #[test]
    fn approaching_target_coasts_and_resets_integrator() {
        let mut c = controller(staged_cfg(), 0.0);
        c.update(0.5, 150.0, 200.0).unwrap();
        c.update(1.0, 190.0, 200.0).unwrap();
        assert_eq!(c.state(), ControlState::MaxPower);
        let tick = c.update(1.5, 198.0, 200.0).unwrap();
        assert_eq!(tick.power, 1.0);
        assert_eq!(c.state(), ControlState::CoastUp);
        assert_eq!(c.pid().integrator(), 0.0);
        assert_eq!(c.update(2.0, 199.0, 200.0).unwrap().power, 0.0);
    }

    #[test]
    fn coast_up_ends_when_temperature_peaks() {
        let mut c = controller(staged_cfg(), 0.0);
        c.update(0.0, 190.0, 200.0).unwrap();
        c.update(1.0, 198.0, 200.0).unwrap();
        assert_eq!(c.state(), ControlState::CoastUp);
        let mut t = 1.0;
        let mut temp = 198.0;
        while c.state() == ControlState::CoastUp && t < 8.0 {
            t += 1.0;
            temp -= 1.0;
            c.update(t, temp, 200.0).unwrap();
        }
        assert_eq!(c.state(), ControlState::Regulate);
        assert!(t < 8.0);
    }

    #[test]
    fn target_change_while_coasting_forces_regulate() {
        let mut c = controller(staged_cfg(), 0.0);
        c.update(0.0, 190.0, 200.0).unwrap();
        c.update(1.0, 198.0, 200.0).unwrap();
        assert_eq!(c.state(), ControlState::CoastUp);
        c.update(1.5, 199.0, 201.0).unwrap();
        assert_eq!(c.state(), ControlState::Regulate);
        assert_eq!(c.context().last_state_change, f64::NEG_INFINITY);
        // dwell gating is bypassed, so leaving the band exits immediately
        c.update(2.0, 190.0, 201.0).unwrap();
        assert_eq!(c.state(), ControlState::MaxPower);
    }

    #[test]
    fn regulate_inside_band_blends_feedback_and_feedforward() {
        let mut c = controller(staged_cfg(), 0.004);
        c.ctx.state = ControlState::Regulate;
        c.ctx.last_state_change = 0.0;
        c.ctx.prev_temp = 199.5;
        c.ctx.prev_temp_time = 19.5;
        c.pid = PidBlock::new(
            PidCfg {
                gains: PidGains {
                    kp: 0.05,
                    ki: 0.0,
                    kd: 0.0,
                },
                min_deriv_time: 2.0,
            },
            1.0,
        );
        let tick = c.update(20.0, 199.5, 200.0).unwrap();
        assert_eq!(c.state(), ControlState::Regulate);
        // fb = 0.05 * 0.5, ff = 200 * 0.004
        assert!((tick.power - (0.025 + 0.8)).abs() < 1e-9);
    }

    #[test]
    fn regulate_without_feedback_runs_feedforward_only() {
        let mut cfg = staged_cfg();
        cfg.fb_enable = false;
        let mut c = controller(cfg, 0.004);
        c.ctx.state = ControlState::Regulate;
        let tick = c.update(20.0, 198.0, 200.0).unwrap();
        assert!((tick.power - 0.8).abs() < 1e-9);
    }

    #[test]
    fn regulate_leaves_band_after_min_duration() {
        let mut c = controller(staged_cfg(), 0.0);
        c.ctx.state = ControlState::Regulate;
        c.ctx.last_state_change = 0.0;
        c.update(2.0, 180.0, 200.0).unwrap();
        assert_eq!(c.state(), ControlState::Regulate);
        c.update(6.0, 180.0, 200.0).unwrap();
        assert_eq!(c.state(), ControlState::MaxPower);
    }

    #[test]
    fn overshoot_walks_through_min_power_and_coast_down() {
        let mut c = controller(staged_cfg(), 0.0);
        c.ctx.state = ControlState::Regulate;
        c.ctx.prev_temp = 220.0;
        c.ctx.prev_temp_time = 9.0;
        c.update(10.0, 220.0, 200.0).unwrap();
        assert_eq!(c.state(), ControlState::MinPower);
        assert_eq!(c.update(11.0, 210.0, 200.0).unwrap().power, 0.0);
        assert_eq!(c.state(), ControlState::MinPower);
        c.update(12.0, 202.0, 200.0).unwrap();
        assert_eq!(c.state(), ControlState::CoastDown);
        assert_eq!(c.pid().integrator(), 0.0);
        assert_eq!(c.update(13.0, 201.0, 200.0).unwrap().power, 1.0);
    }

    #[test]
    fn output_is_bounded_by_max_power() {
        let mut c = controller(staged_cfg(), 0.1);
        c.ctx.state = ControlState::Regulate;
        let tick = c.update(20.0, 199.0, 200.0).unwrap();
        assert_eq!(tick.power, 1.0);
    }

    #[test]
    fn nan_temperature_is_reported() {
        let mut c = controller(staged_cfg(), 0.0);
        assert!(matches!(
            c.update(1.0, f64::NAN, 200.0),
            Err(ControlError::NumericInstability { .. })
        ));
    }
}
