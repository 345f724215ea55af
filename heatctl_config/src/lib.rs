#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas for the heater control engine.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Each `[[heater]]` carries its own `pid`, `feedforward`, `staged` and
//!   optional persisted `calibration` tables; autotune, simulation and
//!   logging settings are shared.
use serde::Deserialize;

/// Which controller drives a heater during normal operation.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// Staged state machine (max power / coast / regulate) with feedforward.
    #[default]
    Staged,
    /// Plain PID loop.
    Pid,
}

impl ControlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMode::Staged => "staged",
            ControlMode::Pid => "pid",
        }
    }
}

/// PID gains in the 0-255 parameter base used by tuning reports.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PidCfg {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// Minimum window (s) for a plain finite-difference derivative.
    pub deriv_time: f64,
}

impl Default for PidCfg {
    fn default() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            deriv_time: 2.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedforwardCfg {
    /// Steady-state gain: power per degree of setpoint.
    pub k_ss: f64,
    /// Power per unit of part-cooling fan speed.
    pub k_fan: f64,
    /// Power per unit of extruder velocity.
    pub k_ev: f64,
    /// EMA factor for the extruder velocity filter, (0.0, 1.0].
    pub ev_smoothing: f64,
    /// Setpoint offset subtracted while the nozzle is on the first layer.
    pub dt_first_layer: f64,
    /// Add PID feedback on top of the feedforward term in Regulate.
    pub fb_enable: bool,
}

impl Default for FeedforwardCfg {
    fn default() -> Self {
        Self {
            k_ss: 0.0,
            k_fan: 0.0,
            k_ev: 0.0,
            ev_smoothing: 0.1,
            dt_first_layer: 1.5,
            fb_enable: true,
        }
    }
}

/// Thresholds for the staged state machine.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StagedCfg {
    pub t_overshoot_up: f64,
    pub coast_time_up: f64,
    pub t_overshoot_down: f64,
    pub coast_time_down: f64,
    /// Half-width of the error window kept by Regulate.
    pub regulation_band: f64,
    /// Seconds Regulate holds before leaving on a large error.
    pub min_duration: f64,
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
        }
    }
}

/// Tuning results written back by a previous calibration run.
///
/// Keys accept the spelling used in calibration reports (`Kss`, `Kp`, ...).
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PersistedCalibration {
    #[serde(alias = "Kss")]
    pub k_ss: f64,
    pub t_overshoot_up: f64,
    pub coast_time_up: f64,
    pub t_overshoot_down: f64,
    pub coast_time_down: f64,
    pub min_duration: f64,
    #[serde(alias = "Kp")]
    pub kp: f64,
    #[serde(alias = "Ki")]
    pub ki: f64,
    #[serde(alias = "Kd")]
    pub kd: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HeaterCfg {
    pub name: String,
    #[serde(default = "default_max_power")]
    pub max_power: f64,
    #[serde(default)]
    pub control: ControlMode,
    /// Time constant (s) of the temperature smoothing used by settle checks.
    #[serde(default = "default_smooth_time")]
    pub smooth_time: f64,
    #[serde(default)]
    pub pid: PidCfg,
    #[serde(default)]
    pub feedforward: FeedforwardCfg,
    #[serde(default)]
    pub staged: StagedCfg,
    #[serde(default)]
    pub calibration: Option<PersistedCalibration>,
}

fn default_max_power() -> f64 {
    1.0
}

fn default_smooth_time() -> f64 {
    1.0
}

impl HeaterCfg {
    /// Copy of this heater with persisted calibration values folded into the
    /// `pid`, `feedforward` and `staged` tables.
    pub fn with_calibration_applied(&self) -> HeaterCfg {
        let mut out = self.clone();
        if let Some(cal) = self.calibration {
            out.feedforward.k_ss = cal.k_ss;
            out.staged.t_overshoot_up = cal.t_overshoot_up;
            out.staged.coast_time_up = cal.coast_time_up;
            out.staged.t_overshoot_down = cal.t_overshoot_down;
            out.staged.coast_time_down = cal.coast_time_down;
            out.staged.min_duration = cal.min_duration;
            out.pid.kp = cal.kp;
            out.pid.ki = cal.ki;
            out.pid.kd = cal.kd;
        }
        out
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AutotuneCfg {
    /// Relay hysteresis: the heater re-enables at `target - hysteresis`.
    pub hysteresis: f64,
    /// Ambient temperature assumed by the process-gain estimate.
    pub ambient: f64,
    /// Peaks required before the relay experiment may finish.
    pub min_peaks: usize,
    /// Hard cap on a calibration run.
    pub max_duration_s: u64,
    /// Scheduler cadence while calibrating.
    pub tick_ms: u64,
}

impl Default for AutotuneCfg {
    fn default() -> Self {
        Self {
            hysteresis: 5.0,
            ambient: 20.0,
            min_peaks: 12,
            max_duration_s: 3600,
            tick_ms: 500,
        }
    }
}

/// First-order-with-dead-time plant used by the simulated heater.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationCfg {
    pub ambient: f64,
    /// Steady-state rise above ambient at full power.
    pub gain: f64,
    pub time_constant: f64,
    pub dead_time: f64,
    /// Steady-state temperature drop at full fan speed.
    pub fan_cooling: f64,
    pub initial_temp: f64,
    /// Peak-to-peak sensor noise amplitude.
    pub noise: f64,
    /// Fan speed (0..1) applied during simulated runs.
    pub fan_speed: f64,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        Self {
            ambient: 25.0,
            gain: 250.0,
            time_constant: 90.0,
            dead_time: 3.0,
            fan_cooling: 15.0,
            initial_temp: 25.0,
            noise: 0.0,
            fan_speed: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(rename = "heater")]
    pub heaters: Vec<HeaterCfg>,
    #[serde(default)]
    pub autotune: AutotuneCfg,
    #[serde(default)]
    pub simulation: SimulationCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &std::path::Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn heater(&self, name: &str) -> Option<&HeaterCfg> {
        self.heaters.iter().find(|h| h.name == name)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.heaters.is_empty() {
            eyre::bail!("at least one [[heater]] section is required");
        }
        for (i, h) in self.heaters.iter().enumerate() {
            if h.name.trim().is_empty() {
                eyre::bail!("heater[{i}].name must not be empty");
            }
            if self.heaters[..i].iter().any(|o| o.name == h.name) {
                eyre::bail!("heater '{}' is defined more than once", h.name);
            }
            h.validate()?;
        }

        // Autotune
        let a = &self.autotune;
        if !(a.hysteresis.is_finite() && a.hysteresis > 0.0) {
            eyre::bail!("autotune.hysteresis must be > 0");
        }
        if !a.ambient.is_finite() {
            eyre::bail!("autotune.ambient must be finite");
        }
        if a.min_peaks < 12 {
            eyre::bail!("autotune.min_peaks must be >= 12");
        }
        if a.max_duration_s == 0 {
            eyre::bail!("autotune.max_duration_s must be >= 1");
        }
        if a.tick_ms == 0 {
            eyre::bail!("autotune.tick_ms must be >= 1");
        }

        // Simulation
        let s = &self.simulation;
        if !(s.gain.is_finite() && s.gain > 0.0) {
            eyre::bail!("simulation.gain must be > 0");
        }
        if !(s.time_constant.is_finite() && s.time_constant > 0.0) {
            eyre::bail!("simulation.time_constant must be > 0");
        }
        if !(s.dead_time.is_finite() && s.dead_time >= 0.0) {
            eyre::bail!("simulation.dead_time must be >= 0");
        }
        if s.noise.is_sign_negative() {
            eyre::bail!("simulation.noise must be >= 0");
        }
        if !(0.0..=1.0).contains(&s.fan_speed) {
            eyre::bail!("simulation.fan_speed must be in [0.0, 1.0]");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}

impl HeaterCfg {
    fn validate(&self) -> eyre::Result<()> {
        let name = &self.name;
        if !(self.max_power > 0.0 && self.max_power <= 1.0) {
            eyre::bail!("heater '{name}': max_power must be in (0.0, 1.0]");
        }
        if !(self.smooth_time.is_finite() && self.smooth_time > 0.0) {
            eyre::bail!("heater '{name}': smooth_time must be > 0");
        }

        // PID
        for (key, v) in [("kp", self.pid.kp), ("ki", self.pid.ki), ("kd", self.pid.kd)] {
            if !v.is_finite() || v < 0.0 {
                eyre::bail!("heater '{name}': pid.{key} must be a finite value >= 0");
            }
        }
        if !(self.pid.deriv_time.is_finite() && self.pid.deriv_time > 0.0) {
            eyre::bail!("heater '{name}': pid.deriv_time must be > 0");
        }

        // Feedforward
        let ff = &self.feedforward;
        for (key, v) in [
            ("k_ss", ff.k_ss),
            ("k_fan", ff.k_fan),
            ("k_ev", ff.k_ev),
            ("dt_first_layer", ff.dt_first_layer),
        ] {
            if !v.is_finite() {
                eyre::bail!("heater '{name}': feedforward.{key} must be finite");
            }
        }
        if !(ff.ev_smoothing > 0.0 && ff.ev_smoothing <= 1.0) {
            eyre::bail!("heater '{name}': feedforward.ev_smoothing must be in (0.0, 1.0]");
        }

        // Staged thresholds
        let st = &self.staged;
        for (key, v) in [
            ("t_overshoot_up", st.t_overshoot_up),
            ("coast_time_up", st.coast_time_up),
            ("t_overshoot_down", st.t_overshoot_down),
            ("coast_time_down", st.coast_time_down),
            ("min_duration", st.min_duration),
        ] {
            if !v.is_finite() || v < 0.0 {
                eyre::bail!("heater '{name}': staged.{key} must be a finite value >= 0");
            }
        }
        if !(st.regulation_band.is_finite() && st.regulation_band > 0.0) {
            eyre::bail!("heater '{name}': staged.regulation_band must be > 0");
        }

        if let Some(cal) = &self.calibration {
            let values = [
                cal.k_ss,
                cal.t_overshoot_up,
                cal.coast_time_up,
                cal.t_overshoot_down,
                cal.coast_time_down,
                cal.min_duration,
                cal.kp,
                cal.ki,
                cal.kd,
            ];
            if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
                eyre::bail!("heater '{name}': calibration values must be finite and >= 0");
            }
        }
        Ok(())
    }
}
