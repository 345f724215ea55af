//! Runtime configuration types for the control engine.
//!
//! These are the structs consumed by controllers and the relay tuner. They are
//! separate from the TOML-deserialized config in `heatctl_config`; gains here
//! are already in actuation units (see `PidGains::PARAM_BASE`).

use std::time::Duration;

/// PID gains in actuation units per kelvin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    /// Persisted gains are written on a 0-255 scale.
    pub const PARAM_BASE: f64 = 255.0;

    pub fn from_param_base(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp: kp / Self::PARAM_BASE,
            ki: ki / Self::PARAM_BASE,
            kd: kd / Self::PARAM_BASE,
        }
    }

    /// Gains expressed on the persisted 0-255 scale.
    pub fn to_param_base(self) -> (f64, f64, f64) {
        (
            self.kp * Self::PARAM_BASE,
            self.ki * Self::PARAM_BASE,
            self.kd * Self::PARAM_BASE,
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PidCfg {
    pub gains: PidGains,
    /// Minimum window (s) of the filtered derivative.
    pub min_deriv_time: f64,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            gains: PidGains {
                kp: 0.0,
                ki: 0.0,
                kd: 0.0,
            },
            min_deriv_time: 2.0,
        }
    }
}

/// Static feedforward coefficients.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeedforwardParams {
    pub k_ss: f64,
    pub k_fan: f64,
    pub k_ev: f64,
    /// Setpoint reduction while printing the first layer.
    pub dt_first_layer: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct FeedforwardCfg {
    pub params: FeedforwardParams,
    /// EMA weight applied to each new extruder-velocity sample. Range (0, 1].
    pub ev_smoothing: f64,
}

impl Default for FeedforwardCfg {
    fn default() -> Self {
        Self {
            params: FeedforwardParams {
                dt_first_layer: 1.5,
                ..FeedforwardParams::default()
            },
            ev_smoothing: 0.1,
        }
    }
}

/// Switching parameters of the staged state machine.
#[derive(Debug, Clone, Copy)]
pub struct StagedCfg {
    pub t_overshoot_up: f64,
    pub coast_time_up: f64,
    pub t_overshoot_down: f64,
    pub coast_time_down: f64,
    /// Half-width (K) of the band in which feedback plus feedforward regulate.
    pub regulation_band: f64,
    /// Minimum dwell (s) in Regulate before leaving it.
    pub min_duration: f64,
    /// When false, Regulate runs on feedforward alone.
    pub fb_enable: bool,
}

impl Default for StagedCfg {
    fn default() -> Self {
        Self {
            t_overshoot_up: 0.0,
            coast_time_up: 0.0,
            t_overshoot_down: 0.0,
            coast_time_down: 0.0,
            regulation_band: 10.0,
            min_duration: 10.0,
            fb_enable: true,
        }
    }
}

/// Relay experiment settings.
#[derive(Debug, Clone)]
pub struct AutotuneCfg {
    pub hysteresis: f64,
    pub ambient: f64,
    pub min_peaks: usize,
    pub max_duration: Duration,
    pub tick: Duration,
}

impl Default for AutotuneCfg {
    fn default() -> Self {
        Self {
            hysteresis: 5.0,
            ambient: 20.0,
            min_peaks: 12,
            max_duration: Duration::from_secs(3600),
            tick: Duration::from_millis(500),
        }
    }
}
