//! Subcommand implementations: simulated runs, calibration and self-check.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use eyre::WrapErr;
use heatctl_config::Config;
use heatctl_core::calibration::{CalibrationOutcome, ParamValue};
use heatctl_core::config::{AutotuneCfg, PidGains};
use heatctl_core::error::{AbortReason, ControlError};
use heatctl_core::{
    CalibrationRequest, Disturbances, HeaterRegistry, PacedScheduler, RunSummary, TickOutcome,
    bind_heater, calibrate,
};
use heatctl_hardware::{PlantParams, SharedSignal, SimulatedHeater};
use heatctl_traits::clock::{Clock, MonotonicClock, VirtualClock};
use serde_json::json;

/// Bind every configured heater to a simulated plant sharing one fan signal.
pub fn build_registry(cfg: &Config) -> eyre::Result<HeaterRegistry> {
    let sim = &cfg.simulation;
    let fan = SharedSignal::new(sim.fan_speed);
    let params = PlantParams {
        ambient: sim.ambient,
        gain: sim.gain,
        time_constant: sim.time_constant,
        dead_time: sim.dead_time,
        fan_cooling: sim.fan_cooling,
    };
    let mut registry = HeaterRegistry::new();
    for (i, h) in cfg.heaters.iter().enumerate() {
        let mut heater = SimulatedHeater::new(&h.name, params, sim.initial_temp)
            .with_max_power(h.max_power)
            .with_fan(fan.clone());
        if sim.noise > 0.0 {
            // Distinct seed per heater so parallel channels do not share noise.
            heater = heater.with_noise(sim.noise, 0x5eed_u32.wrapping_add(i as u32));
        }
        let disturbances = Disturbances::default().with_fan(fan.clone());
        let binding = bind_heater(h, Box::new(heater), disturbances)
            .wrap_err_with(|| format!("bind heater '{}'", h.name))?;
        registry.insert(binding)?;
    }
    tracing::debug!(heaters = registry.len(), "registry built");
    Ok(registry)
}

fn scheduler(period: Duration, realtime: bool, shutdown: &Arc<AtomicBool>) -> PacedScheduler {
    let clock: Arc<dyn Clock + Send + Sync> = if realtime {
        Arc::new(MonotonicClock::new())
    } else {
        Arc::new(VirtualClock::new())
    };
    PacedScheduler::new(clock, period).with_shutdown(Arc::clone(shutdown))
}

struct TraceWriter {
    out: BufWriter<File>,
    json: bool,
}

impl TraceWriter {
    fn create(path: &Path, json: bool) -> eyre::Result<Self> {
        let file = File::create(path).wrap_err_with(|| format!("create trace {path:?}"))?;
        let mut out = BufWriter::new(file);
        if !json {
            writeln!(out, "time\ttemperature\ttarget\tpower\tstate")?;
        }
        Ok(Self { out, json })
    }

    fn record(&mut self, o: &TickOutcome) -> std::io::Result<()> {
        let state = o.state.unwrap_or(o.controller);
        if self.json {
            let line = json!({
                "time": o.read_time,
                "temperature": o.temperature,
                "target": o.target,
                "power": o.power,
                "state": state,
                "fault": o.fault.as_ref().map(ToString::to_string),
            });
            writeln!(self.out, "{line}")
        } else {
            let temp = o
                .temperature
                .map_or_else(|| "nan".to_string(), |t| format!("{t:.3}"));
            writeln!(
                self.out,
                "{:.3}\t{temp}\t{:.3}\t{:.4}\t{state}",
                o.read_time, o.target, o.power
            )
        }
    }
}

/// Arguments of the `run` subcommand.
#[derive(Debug)]
pub struct RunRequest<'a> {
    pub heater: &'a str,
    pub target: f64,
    pub seconds: f64,
    pub tick_ms: Option<u64>,
    pub trace: Option<&'a Path>,
    pub realtime: bool,
}

pub fn run(
    cfg: &Config,
    req: &RunRequest<'_>,
    json: bool,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<()> {
    let RunRequest {
        heater,
        target,
        seconds,
        tick_ms,
        trace,
        realtime,
    } = *req;
    if !(seconds.is_finite() && seconds > 0.0) {
        return Err(eyre::Report::new(ControlError::Config(format!(
            "--seconds must be > 0 (got {seconds})"
        ))));
    }
    if !target.is_finite() {
        return Err(eyre::Report::new(ControlError::Config(
            "--target must be finite".into(),
        )));
    }
    let period = Duration::from_millis(tick_ms.unwrap_or(cfg.autotune.tick_ms).max(1));
    let mut registry = build_registry(cfg)?;
    let binding = registry.lookup_mut(heater)?;
    binding.set_target(target);

    let mut writer = trace.map(|p| TraceWriter::create(p, json)).transpose()?;
    let mut write_err: Option<std::io::Error> = None;
    tracing::info!(heater, target, seconds, "run start");
    let summary = scheduler(period, realtime, shutdown).run_for(
        binding,
        Duration::from_secs_f64(seconds),
        |o| {
            if let Some(w) = writer.as_mut()
                && write_err.is_none()
                && let Err(e) = w.record(o)
            {
                write_err = Some(e);
            }
        },
    );
    if let Some(e) = write_err {
        return Err(eyre::Report::new(e).wrap_err("write trace"));
    }
    if let Some(mut w) = writer {
        w.out.flush().wrap_err("flush trace")?;
    }

    print_summary(heater, target, &summary, json);
    if summary.interrupted {
        return Err(eyre::Report::new(ControlError::Abort(
            AbortReason::Interrupted,
        )));
    }
    Ok(())
}

fn print_summary(heater: &str, target: f64, s: &RunSummary, json: bool) {
    let state = s.final_state.unwrap_or("-");
    if json {
        let line = json!({
            "heater": heater,
            "target": target,
            "final_temperature": s.final_temperature,
            "state": s.final_state,
            "settled": s.settled,
            "settled_at_s": s.settled_at,
            "elapsed_s": s.elapsed,
            "ticks": s.ticks,
            "faults": s.faults,
            "interrupted": s.interrupted,
        });
        println!("{line}");
        return;
    }
    match s.final_temperature {
        Some(t) => println!("Heater '{heater}': {t:.2} (target {target:.1}), state {state}"),
        None => println!("Heater '{heater}': no valid reading (target {target:.1}), state {state}"),
    }
    match s.settled_at {
        Some(at) => println!("Settled after {at:.1} s"),
        None => println!("Not settled after {:.1} s", s.elapsed),
    }
    if s.faults > 0 {
        println!("{} of {} ticks faulted", s.faults, s.ticks);
    }
}

pub fn run_calibration(
    cfg: &Config,
    request: &CalibrationRequest,
    json: bool,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<()> {
    let autotune = AutotuneCfg::from(&cfg.autotune);
    let mut registry = build_registry(cfg)?;
    let mut sched =
        scheduler(autotune.tick, false, shutdown).with_max_duration(autotune.max_duration);
    let outcome = calibrate(&mut registry, request, &autotune, &mut sched)?;
    if json {
        println!("{}", outcome_json(&outcome));
    } else {
        println!("{}", outcome.report());
        println!();
        println!("[heater.calibration]");
        for (key, value) in outcome.persisted_params() {
            match value {
                ParamValue::Text(s) => println!("{key} = \"{s}\""),
                ParamValue::Number(_) => println!("{key} = {value}"),
            }
        }
    }
    Ok(())
}

fn gains_json(g: PidGains) -> serde_json::Value {
    let (kp, ki, kd) = g.to_param_base();
    json!({ "kp": kp, "ki": ki, "kd": kd })
}

fn outcome_json(o: &CalibrationOutcome) -> serde_json::Value {
    let m = o.model();
    let params: serde_json::Map<String, serde_json::Value> = o
        .persisted_params()
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                ParamValue::Text(s) => json!(s),
                ParamValue::Number(n) => json!(n),
            };
            (k.to_string(), v)
        })
        .collect();
    json!({
        "heater": o.heater,
        "target": o.target,
        "peaks": o.fit.peaks,
        "cycle": o.fit.cycle.index,
        "amplitude": o.fit.cycle.amplitude,
        "duty_cycle": o.fit.cycle.duty_cycle,
        "model": {
            "ku": m.ku,
            "tu": m.tu,
            "k": m.k,
            "tau": m.tau,
            "dead_time": m.dead_time,
            "kss": m.kss,
        },
        "tyreus_luyben": gains_json(o.tyreus_luyben),
        "amigo": gains_json(o.amigo),
        "params": params,
    })
}

/// Bind every heater and take one reading from each.
pub fn self_check(cfg: &Config, json: bool) -> eyre::Result<()> {
    let mut registry = build_registry(cfg)?;
    let names: Vec<String> = registry.names().map(str::to_string).collect();
    let mut readings = Vec::with_capacity(names.len());
    for name in &names {
        let binding = registry.lookup_mut(name)?;
        let outcome = binding.tick(0.0);
        if let Some(fault) = outcome.fault {
            return Err(eyre::Report::new(fault).wrap_err(format!("self-check of '{name}'")));
        }
        readings.push((name.clone(), outcome.temperature, outcome.controller));
    }
    if json {
        let heaters: Vec<_> = readings
            .iter()
            .map(|(n, t, c)| json!({ "name": n, "temperature": t, "controller": c }))
            .collect();
        println!("{}", json!({ "status": "ok", "heaters": heaters }));
    } else {
        for (n, t, c) in &readings {
            let t = t.map_or_else(|| "-".to_string(), |t| format!("{t:.2}"));
            println!("{n}: {t} ({c})");
        }
        println!("OK: {} heater(s)", readings.len());
    }
    Ok(())
}
