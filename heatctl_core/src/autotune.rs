//! Relay (bang-bang) autotune.
//!
//! The tuner drives the heater at full power until the temperature reaches
//! the calibration target, then turns it off until the temperature falls to
//! `target - hysteresis`, and repeats. Every switch records the extreme seen
//! during the preceding half-cycle as a peak. Once enough peaks exist, the
//! median-period cycle is fitted to a FOWDT model and the staged switching
//! parameters are read off the same cycle.

use std::fmt::Write as _;
use std::path::Path;

use crate::atomic::write_atomic;
use crate::controller::{ControlTick, Controller};
use crate::error::{CalibrationFailure, ControlError};
use crate::fowdt::{FowdtModel, ultimate_gain};
use crate::util::step_mean;

/// Six full oscillation cycles; fewer give an unreliable estimate. Applied as
/// a floor to the configured `min_peaks`.
pub const MIN_PEAKS: usize = 12;
/// Floor applied to the measured duty cycle before dividing by it.
const MIN_DUTY: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakRecord {
    pub temp: f64,
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaySettings {
    pub target: f64,
    pub hysteresis: f64,
    pub ambient: f64,
    pub min_peaks: usize,
    pub max_power: f64,
    /// Actuator latency added to each recorded power switch.
    pub pwm_delay: f64,
}

/// Switching parameters of the staged controller, as measured on one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwitchingParams {
    pub t_overshoot_up: f64,
    pub coast_time_up: f64,
    pub t_overshoot_down: f64,
    pub coast_time_down: f64,
    pub min_duration: f64,
}

/// Model fitted to the cycle ending at peak `index`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleFit {
    pub index: usize,
    /// Half of the peak-to-peak temperature swing.
    pub amplitude: f64,
    /// Time-averaged actuation over the cycle.
    pub duty_cycle: f64,
    pub model: FowdtModel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayFit {
    pub cycle: CycleFit,
    pub switching: SwitchingParams,
    pub peaks: usize,
}

#[derive(Debug, Clone)]
pub struct RelayAutotune {
    settings: RelaySettings,
    heating: bool,
    peak: f64,
    peak_time: f64,
    peaks: Vec<PeakRecord>,
    last_pwm: f64,
    pwm_samples: Vec<(f64, f64)>,
    temp_samples: Vec<(f64, f64)>,
}

impl RelayAutotune {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            settings,
            heating: false,
            peak: f64::NEG_INFINITY,
            peak_time: 0.0,
            peaks: Vec::new(),
            last_pwm: 0.0,
            pwm_samples: Vec::new(),
            temp_samples: Vec::new(),
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn peaks(&self) -> &[PeakRecord] {
        &self.peaks
    }

    /// `(time, power)` switch points, shifted by the actuator delay.
    pub fn pwm_samples(&self) -> &[(f64, f64)] {
        &self.pwm_samples
    }

    pub fn temp_samples(&self) -> &[(f64, f64)] {
        &self.temp_samples
    }

    /// The relay is still heating or has not recorded enough peaks.
    pub fn is_busy(&self) -> bool {
        self.heating || self.peaks.len() < self.required_peaks()
    }

    fn required_peaks(&self) -> usize {
        self.settings.min_peaks.max(MIN_PEAKS)
    }

    fn record_peak(&mut self) {
        self.peaks.push(PeakRecord {
            temp: self.peak,
            time: self.peak_time,
        });
        self.peak = if self.heating {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        };
        let n = self.peaks.len();
        tracing::debug!(
            peak = n,
            temp = self.peaks[n - 1].temp,
            time = self.peaks[n - 1].time,
            "relay peak"
        );
        if n >= 4 {
            match self.fit_cycle(n - 1) {
                Ok(fit) => tracing::debug!(
                    peak = n,
                    ku = fit.model.ku,
                    tu = fit.model.tu,
                    tau = fit.model.tau,
                    dead_time = fit.model.dead_time,
                    "relay cycle fit"
                ),
                Err(e) => tracing::debug!(peak = n, error = %e, "relay cycle not fittable yet"),
            }
        }
    }

    fn record_pwm(&mut self, read_time: f64, value: f64) {
        if value != self.last_pwm {
            self.pwm_samples
                .push((read_time + self.settings.pwm_delay, value));
            self.last_pwm = value;
        }
    }

    /// Fit the cycle spanning peaks `pos - 2 ..= pos`.
    pub fn fit_cycle(&self, pos: usize) -> Result<CycleFit, CalibrationFailure> {
        if pos < 2 || pos >= self.peaks.len() {
            return Err(CalibrationFailure::DegenerateCycle("cycle index out of range"));
        }
        let start = self.peaks[pos - 2];
        let prev = self.peaks[pos - 1];
        let end = self.peaks[pos];

        let amplitude = 0.5 * (end.temp - prev.temp).abs();
        if !(amplitude > 0.0 && amplitude.is_finite()) {
            return Err(CalibrationFailure::DegenerateCycle("zero oscillation amplitude"));
        }
        let tu = end.time - start.time;
        let duty_cycle = step_mean(&self.pwm_samples, 0.0, start.time, end.time)
            .ok_or(CalibrationFailure::DegenerateCycle("non-positive period"))?;

        let (sum, count) = self
            .temp_samples
            .iter()
            .filter(|(t, _)| *t >= start.time && *t <= end.time)
            .fold((0.0, 0usize), |(s, n), (_, temp)| (s + temp, n + 1));
        if count == 0 {
            return Err(CalibrationFailure::DegenerateCycle("no samples inside cycle"));
        }
        let mean_temp = sum / count as f64;
        if !(mean_temp > 0.0) {
            return Err(CalibrationFailure::DegenerateCycle("non-positive mean temperature"));
        }

        let k = (self.settings.target - self.settings.ambient) / duty_cycle.max(MIN_DUTY);
        let kss = duty_cycle / mean_temp;
        let ku = ultimate_gain(self.settings.max_power, amplitude);
        let model = FowdtModel::from_ultimate(ku, tu, k, kss)?;
        Ok(CycleFit {
            index: pos,
            amplitude,
            duty_cycle,
            model,
        })
    }

    /// Switching parameters measured on the two peaks closing cycle `pos`.
    fn switching_params(&self, pos: usize, model: &FowdtModel) -> SwitchingParams {
        let a = self.peaks[pos - 1];
        let b = self.peaks[pos];
        let (hi, lo) = if a.temp >= b.temp { (a, b) } else { (b, a) };

        let last_switch = |at: f64, on: bool| {
            self.pwm_samples
                .iter()
                .rev()
                .find(|(t, v)| *t <= at && (*v > 0.0) == on)
                .map_or(0.0, |(t, _)| at - t)
        };

        SwitchingParams {
            t_overshoot_up: (hi.temp - self.settings.target).max(0.0),
            coast_time_up: last_switch(hi.time, false),
            t_overshoot_down: ((self.settings.target - self.settings.hysteresis) - lo.temp)
                .max(0.0),
            coast_time_down: last_switch(lo.time, true),
            min_duration: (model.dead_time * 10.0).ceil() / 10.0,
        }
    }

    /// Fit the median-period cycle of the completed experiment.
    pub fn analyze(&self) -> Result<RelayFit, CalibrationFailure> {
        let required = self.required_peaks();
        if self.peaks.len() < required {
            return Err(CalibrationFailure::InsufficientPeaks {
                found: self.peaks.len(),
                required,
            });
        }
        let mut cycles: Vec<(f64, usize)> = (4..self.peaks.len())
            .map(|pos| (self.peaks[pos].time - self.peaks[pos - 2].time, pos))
            .collect();
        cycles.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let pos = cycles
            .get(cycles.len() / 2)
            .map(|c| c.1)
            .ok_or(CalibrationFailure::DegenerateCycle("no complete cycle"))?;

        let cycle = self.fit_cycle(pos)?;
        let switching = self.switching_params(pos, &cycle.model);
        Ok(RelayFit {
            cycle,
            switching,
            peaks: self.peaks.len(),
        })
    }

    /// Dump the raw experiment: `pwm: <time> <value>` lines followed by
    /// `<time> <temperature>` lines.
    pub fn write_diagnostics(&self, path: &Path) -> Result<(), ControlError> {
        let mut out = String::new();
        self.render_samples(&mut out)
            .map_err(|e| ControlError::Io(format!("render relay samples: {e}")))?;
        write_atomic(path, out.as_bytes())
            .map_err(|e| ControlError::Io(format!("{}: {e}", path.display())))
    }

    fn render_samples(&self, out: &mut String) -> std::fmt::Result {
        for (t, v) in &self.pwm_samples {
            writeln!(out, "pwm: {t:.3} {v:.3}")?;
        }
        for (t, temp) in &self.temp_samples {
            writeln!(out, "{t:.3} {temp:.3}")?;
        }
        Ok(())
    }
}

impl Controller for RelayAutotune {
    fn name(&self) -> &'static str {
        "relay-autotune"
    }

    /// Switches on the tuner's own thresholds; `target_temp` only mirrors
    /// the retarget requests issued here.
    fn update(
        &mut self,
        read_time: f64,
        temp: f64,
        _target_temp: f64,
    ) -> Result<ControlTick, ControlError> {
        if !temp.is_finite() {
            return Err(ControlError::NumericInstability {
                stage: "relay autotune",
            });
        }
        if self.temp_samples.is_empty() {
            self.peak = temp;
            self.peak_time = read_time;
        }
        self.temp_samples.push((read_time, temp));

        let mut retarget = None;
        if self.heating && temp >= self.settings.target {
            self.heating = false;
            self.record_peak();
            retarget = Some(self.settings.target - self.settings.hysteresis);
        } else if !self.heating && temp <= self.settings.target - self.settings.hysteresis {
            self.heating = true;
            self.record_peak();
            retarget = Some(self.settings.target);
        }

        let power = if self.heating {
            if temp < self.peak {
                self.peak = temp;
                self.peak_time = read_time;
            }
            self.settings.max_power
        } else {
            if temp > self.peak {
                self.peak = temp;
                self.peak_time = read_time;
            }
            0.0
        };
        self.record_pwm(read_time, power);
        Ok(ControlTick { power, retarget })
    }

    fn is_settled(&self, _eventtime: f64, _smoothed_temp: f64, _target_temp: f64) -> bool {
        !self.is_busy()
    }

    fn state_name(&self) -> Option<&'static str> {
        Some(if self.heating { "heating" } else { "cooling" })
    }
}
