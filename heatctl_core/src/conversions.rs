//! `From` conversions between `heatctl_config` (TOML) types and runtime types.

use std::time::Duration;

use crate::config::{AutotuneCfg, FeedforwardCfg, FeedforwardParams, PidCfg, PidGains, StagedCfg};

impl From<&heatctl_config::PidCfg> for PidCfg {
    fn from(p: &heatctl_config::PidCfg) -> Self {
        Self {
            gains: PidGains::from_param_base(p.kp, p.ki, p.kd),
            min_deriv_time: p.deriv_time,
        }
    }
}

impl From<&heatctl_config::FeedforwardCfg> for FeedforwardCfg {
    fn from(f: &heatctl_config::FeedforwardCfg) -> Self {
        Self {
            params: FeedforwardParams {
                k_ss: f.k_ss,
                k_fan: f.k_fan,
                k_ev: f.k_ev,
                dt_first_layer: f.dt_first_layer,
            },
            ev_smoothing: f.ev_smoothing,
        }
    }
}

/// `fb_enable` lives in the feedforward table, so this converts from the whole heater.
impl From<&heatctl_config::HeaterCfg> for StagedCfg {
    fn from(h: &heatctl_config::HeaterCfg) -> Self {
        Self {
            t_overshoot_up: h.staged.t_overshoot_up,
            coast_time_up: h.staged.coast_time_up,
            t_overshoot_down: h.staged.t_overshoot_down,
            coast_time_down: h.staged.coast_time_down,
            regulation_band: h.staged.regulation_band,
            min_duration: h.staged.min_duration,
            fb_enable: h.feedforward.fb_enable,
        }
    }
}

impl From<&heatctl_config::AutotuneCfg> for AutotuneCfg {
    fn from(a: &heatctl_config::AutotuneCfg) -> Self {
        Self {
            hysteresis: a.hysteresis,
            ambient: a.ambient,
            min_peaks: a.min_peaks,
            max_duration: Duration::from_secs(a.max_duration_s),
            tick: Duration::from_millis(a.tick_ms.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_gains_are_scaled_from_param_base() {
        let src = heatctl_config::PidCfg {
            kp: 25.5,
            ki: 2.55,
            kd: 255.0,
            deriv_time: 2.0,
        };
        let cfg = PidCfg::from(&src);
        assert!((cfg.gains.kp - 0.1).abs() < 1e-12);
        assert!((cfg.gains.ki - 0.01).abs() < 1e-12);
        assert!((cfg.gains.kd - 1.0).abs() < 1e-12);
    }

    #[test]
    fn staged_picks_up_feedback_switch() {
        let mut h: heatctl_config::HeaterCfg =
            toml::from_str("name = \"extruder\"").expect("minimal heater");
        h.feedforward.fb_enable = false;
        h.staged.regulation_band = 4.0;
        let cfg = StagedCfg::from(&h);
        assert!(!cfg.fb_enable);
        assert_eq!(cfg.regulation_band, 4.0);
    }
}
