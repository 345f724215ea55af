//! Calibration command: relay experiment on a named heater, model fit, and
//! the resulting report and parameter set.

use std::path::PathBuf;

use crate::autotune::{RelayAutotune, RelayFit, RelaySettings};
use crate::config::{AutotuneCfg, PidGains};
use crate::error::{AbortReason, CalibrationFailure, ControlError, Result};
use crate::fowdt::FowdtModel;
use crate::registry::HeaterRegistry;
use crate::runner::Scheduler;
use crate::tuning::{amigo, tyreus_luyben};

/// Control mode written alongside calibration results.
pub const CALIBRATED_CONTROL_MODE: &str = "staged";

#[derive(Debug, Clone)]
pub struct CalibrationRequest {
    pub heater: String,
    pub target: f64,
    /// Dump the raw relay experiment here when set.
    pub write_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutcome {
    pub heater: String,
    pub target: f64,
    pub fit: RelayFit,
    pub tyreus_luyben: PidGains,
    pub amigo: PidGains,
}

/// A persisted parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(&'static str),
    Number(f64),
}

impl core::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ParamValue::Text(s) => f.write_str(s),
            ParamValue::Number(v) => write!(f, "{v:.6}"),
        }
    }
}

impl CalibrationOutcome {
    pub fn model(&self) -> &FowdtModel {
        &self.fit.cycle.model
    }

    /// Ordered key/value set a consumer persists. Gains are the AMIGO
    /// result on the 0-255 parameter base.
    pub fn persisted_params(&self) -> Vec<(&'static str, ParamValue)> {
        let s = &self.fit.switching;
        let (kp, ki, kd) = self.amigo.to_param_base();
        vec![
            ("control_mode", ParamValue::Text(CALIBRATED_CONTROL_MODE)),
            ("Kss", ParamValue::Number(self.model().kss)),
            ("t_overshoot_up", ParamValue::Number(s.t_overshoot_up)),
            ("coast_time_up", ParamValue::Number(s.coast_time_up)),
            ("t_overshoot_down", ParamValue::Number(s.t_overshoot_down)),
            ("coast_time_down", ParamValue::Number(s.coast_time_down)),
            ("min_duration", ParamValue::Number(s.min_duration)),
            ("Kp", ParamValue::Number(kp)),
            ("Ki", ParamValue::Number(ki)),
            ("Kd", ParamValue::Number(kd)),
        ]
    }

    /// Human-readable summary of the fit and both tuning rules.
    pub fn report(&self) -> String {
        self.to_string()
    }
}

impl core::fmt::Display for CalibrationOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let m = self.model();
        writeln!(
            f,
            "Calibration of '{}' at {:.1}: {} peaks, cycle {}",
            self.heater, self.target, self.fit.peaks, self.fit.cycle.index
        )?;
        writeln!(
            f,
            "  relay: Ku={:.4} Tu={:.2}s amplitude={:.2} duty={:.3}",
            m.ku, m.tu, self.fit.cycle.amplitude, self.fit.cycle.duty_cycle
        )?;
        writeln!(
            f,
            "  model: K={:.2} tau={:.2}s L={:.2}s Kss={:.6}",
            m.k, m.tau, m.dead_time, m.kss
        )?;
        for (rule, g) in [("Tyreus-Luyben", self.tyreus_luyben), ("AMIGO", self.amigo)] {
            let (kp, ki, kd) = g.to_param_base();
            writeln!(f, "  {rule}: Kp={kp:.3} Ki={ki:.3} Kd={kd:.3}")?;
        }
        let s = &self.fit.switching;
        write!(
            f,
            "  switching: overshoot up={:.2} coast up={:.2}s overshoot down={:.2} coast down={:.2}s min_duration={:.1}s",
            s.t_overshoot_up, s.coast_time_up, s.t_overshoot_down, s.coast_time_down, s.min_duration
        )
    }
}

fn abort_to_failure(e: ControlError) -> ControlError {
    match e {
        ControlError::Abort(AbortReason::Interrupted) => {
            ControlError::Calibration(CalibrationFailure::Interrupted)
        }
        ControlError::Abort(AbortReason::Timeout) => {
            ControlError::Calibration(CalibrationFailure::Timeout)
        }
        other => other,
    }
}

/// Run a relay calibration on `request.heater`.
///
/// The heater's regular controller is parked for the duration and always
/// restored, together with its previous setpoint, whatever the outcome.
pub fn calibrate(
    registry: &mut HeaterRegistry,
    request: &CalibrationRequest,
    cfg: &AutotuneCfg,
    scheduler: &mut dyn Scheduler,
) -> Result<CalibrationOutcome> {
    if !(request.target.is_finite() && request.target - cfg.hysteresis > cfg.ambient) {
        return Err(eyre::Report::new(ControlError::Config(format!(
            "calibration target {:.1} must exceed ambient {:.1} plus hysteresis {:.1}",
            request.target, cfg.ambient, cfg.hysteresis
        ))));
    }
    let binding = registry.lookup_mut(&request.heater)?;
    let tuner = RelayAutotune::new(RelaySettings {
        target: request.target,
        hysteresis: cfg.hysteresis,
        ambient: cfg.ambient,
        min_peaks: cfg.min_peaks,
        max_power: binding.max_power(),
        pwm_delay: binding.pwm_delay(),
    });
    binding.begin_calibration(tuner)?;

    let waited = scheduler.wait_settled(binding);
    let tuner = binding
        .end_calibration()
        .ok_or_else(|| ControlError::State("calibration slot emptied while running".into()))?;

    // The fit does not depend on the dump; a failed write only loses the samples.
    if let Some(path) = &request.write_file {
        match tuner.write_diagnostics(path) {
            Ok(()) => tracing::info!(path = %path.display(), "relay diagnostics written"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to write relay diagnostics")
            }
        }
    }

    let result = waited
        .map_err(abort_to_failure)
        .and_then(|()| {
            if tuner.is_busy() {
                Err(ControlError::Calibration(CalibrationFailure::Interrupted))
            } else {
                tuner.analyze().map_err(ControlError::Calibration)
            }
        });
    let fit = match result {
        Ok(fit) => fit,
        Err(e) => {
            tracing::error!(heater = %request.heater, error = %e, "calibration failed");
            return Err(eyre::Report::new(e));
        }
    };

    let model = fit.cycle.model;
    let outcome = CalibrationOutcome {
        heater: request.heater.clone(),
        target: request.target,
        fit,
        tyreus_luyben: tyreus_luyben(model.ku, model.tu),
        amigo: amigo(&model),
    };
    tracing::info!(
        heater = %request.heater,
        ku = model.ku,
        tu = model.tu,
        tau = model.tau,
        dead_time = model.dead_time,
        kss = model.kss,
        "calibration finished"
    );
    Ok(outcome)
}
