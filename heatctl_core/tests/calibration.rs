use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use heatctl_core::config::AutotuneCfg;
use heatctl_core::mocks::{FakeHeater, FakeHeaterLog};
use heatctl_core::{
    AbortReason, CalibrationFailure, CalibrationRequest, ControlError, HeaterBinding,
    HeaterRegistry, PacedScheduler, Scheduler, bind_heater, calibrate,
};
use heatctl_hardware::{PlantParams, SimulatedHeater};
use heatctl_traits::clock::VirtualClock;

fn plant() -> PlantParams {
    PlantParams {
        ambient: 25.0,
        gain: 250.0,
        time_constant: 90.0,
        dead_time: 3.0,
        fan_cooling: 15.0,
    }
}

fn registry() -> HeaterRegistry {
    registry_with(Box::new(SimulatedHeater::new("extruder", plant(), 25.0)))
}

fn registry_with(heater: Box<dyn heatctl_traits::Heater>) -> HeaterRegistry {
    let cfg = heatctl_config::load_toml(
        r#"
        [[heater]]
        name = "extruder"
        [heater.pid]
        kp = 20.0
        ki = 1.0
        kd = 100.0
        "#,
    )
    .unwrap();
    let mut binding = bind_heater(&cfg.heaters[0], heater, Default::default()).unwrap();
    binding.set_target(60.0);
    let mut r = HeaterRegistry::new();
    r.insert(binding).unwrap();
    r
}

fn autotune() -> AutotuneCfg {
    AutotuneCfg {
        ambient: 25.0,
        ..AutotuneCfg::default()
    }
}

fn request(write_file: Option<std::path::PathBuf>) -> CalibrationRequest {
    CalibrationRequest {
        heater: "extruder".into(),
        target: 200.0,
        write_file,
    }
}

fn scheduler(cfg: &AutotuneCfg) -> PacedScheduler {
    PacedScheduler::new(Arc::new(VirtualClock::new()), cfg.tick).with_max_duration(cfg.max_duration)
}

fn assert_restored(r: &HeaterRegistry) {
    let b = r.lookup("extruder").unwrap();
    assert!(!b.is_calibrating());
    assert_eq!(b.active().name(), "staged");
    assert_eq!(b.target(), 60.0);
}

#[test]
fn relay_calibration_identifies_the_simulated_plant() {
    let cfg = autotune();
    let mut r = registry();
    let outcome = calibrate(&mut r, &request(None), &cfg, &mut scheduler(&cfg)).unwrap();
    assert_restored(&r);

    let m = outcome.model();
    assert!(outcome.fit.peaks >= cfg.min_peaks);
    assert!(m.gain_product() > 1.0);
    // describing-function estimates land in the neighbourhood of the true plant
    assert!(m.k > 150.0 && m.k < 400.0, "K = {}", m.k);
    assert!(m.dead_time > 1.0 && m.dead_time < 15.0, "L = {}", m.dead_time);
    assert!(m.tau > 20.0, "tau = {}", m.tau);
    assert!(m.kss > 0.0 && m.kss < 0.01, "Kss = {}", m.kss);
    assert!(outcome.fit.switching.t_overshoot_up > 0.0);
    assert!(outcome.amigo.kp > 0.0 && outcome.tyreus_luyben.kp > 0.0);

    let params = outcome.persisted_params();
    let keys: Vec<_> = params.iter().map(|(k, _)| *k).collect();
    assert_eq!(
        keys,
        [
            "control_mode",
            "Kss",
            "t_overshoot_up",
            "coast_time_up",
            "t_overshoot_down",
            "coast_time_down",
            "min_duration",
            "Kp",
            "Ki",
            "Kd"
        ]
    );
    assert_eq!(params[0].1.to_string(), "staged");
    assert!(outcome.report().contains("AMIGO"));
}

#[test]
fn diagnostics_are_written_when_requested() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.txt");
    let cfg = autotune();
    let mut r = registry();
    calibrate(&mut r, &request(Some(path.clone())), &cfg, &mut scheduler(&cfg)).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let first = text.lines().next().unwrap();
    assert!(first.starts_with("pwm: "), "{first}");
    assert!(text.lines().filter(|l| !l.starts_with("pwm: ")).count() > 100);
}

#[test]
fn interrupt_aborts_and_restores_controller() {
    let cfg = autotune();
    let mut r = registry();
    let mut s = scheduler(&cfg).with_shutdown(Arc::new(AtomicBool::new(true)));
    let err = calibrate(&mut r, &request(None), &cfg, &mut s).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ControlError>(),
        Some(&ControlError::Calibration(CalibrationFailure::Interrupted))
    );
    assert_restored(&r);
}

#[test]
fn exceeding_max_duration_is_a_timeout() {
    let cfg = AutotuneCfg {
        max_duration: Duration::from_secs(60),
        ..autotune()
    };
    let mut r = registry();
    let err = calibrate(&mut r, &request(None), &cfg, &mut scheduler(&cfg)).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ControlError>(),
        Some(&ControlError::Calibration(CalibrationFailure::Timeout))
    );
    assert_restored(&r);
}

#[test]
fn unknown_heater_is_a_lookup_error() {
    let cfg = autotune();
    let mut r = registry();
    let req = CalibrationRequest {
        heater: "chamber".into(),
        ..request(None)
    };
    let err = calibrate(&mut r, &req, &cfg, &mut scheduler(&cfg)).unwrap_err();
    assert_eq!(
        err.downcast_ref::<ControlError>(),
        Some(&ControlError::Lookup("chamber".into()))
    );
}

#[test]
fn target_below_ambient_is_rejected_before_running() {
    let cfg = autotune();
    let mut r = registry();
    let req = CalibrationRequest {
        target: 28.0,
        ..request(None)
    };
    let err = calibrate(&mut r, &req, &cfg, &mut scheduler(&cfg)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ControlError>(),
        Some(ControlError::Config(_))
    ));
    assert_restored(&r);
}

/// Drives a scripted heater through a 340/60 square wave with a 40 s period,
/// one tick per second.
struct SquareWave {
    log: Rc<RefCell<FakeHeaterLog>>,
}

impl Scheduler for SquareWave {
    fn wait_settled(&mut self, binding: &mut HeaterBinding) -> Result<(), ControlError> {
        for i in 0..=600_u32 {
            let t = f64::from(i);
            self.log.borrow_mut().temperature = if i % 40 < 20 { 340.0 } else { 60.0 };
            binding.tick(t);
            if binding.is_settled(t) {
                return Ok(());
            }
        }
        Err(ControlError::Abort(AbortReason::Timeout))
    }
}

#[test]
fn failed_fit_restores_controller_target_and_state() {
    let heater = FakeHeater::new("extruder", 60.0);
    let mut sched = SquareWave { log: heater.log() };
    let mut r = registry_with(Box::new(heater));
    let state_before = r.lookup("extruder").unwrap().active().state_name();
    // K = (200 - 190) / 0.5 against Ku = 4 / (pi * 140) leaves K * Ku well below 1.
    let cfg = AutotuneCfg {
        ambient: 190.0,
        ..AutotuneCfg::default()
    };

    let err = calibrate(&mut r, &request(None), &cfg, &mut sched).unwrap_err();
    assert!(
        matches!(
            err.downcast_ref::<ControlError>(),
            Some(ControlError::Calibration(
                CalibrationFailure::GainProductTooLow { gain_product }
            )) if *gain_product < 1.0
        ),
        "{err:?}"
    );
    assert_restored(&r);
    let b = r.lookup("extruder").unwrap();
    assert_eq!(b.active().state_name(), state_before);
    assert_eq!(state_before, Some("off"));
}

#[test]
fn unwritable_diagnostics_path_still_returns_the_fit() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "").unwrap();
    let path = blocker.join("relay.txt");
    let cfg = autotune();
    let mut r = registry();

    let outcome =
        calibrate(&mut r, &request(Some(path.clone())), &cfg, &mut scheduler(&cfg)).unwrap();
    assert!(outcome.fit.peaks >= cfg.min_peaks);
    assert!(!path.exists());
    assert_restored(&r);
}
