#![no_main]
use heatctl_core::config::{FeedforwardCfg, FeedforwardParams, PidCfg, PidGains, StagedCfg};
use heatctl_core::{Controller, Disturbances, StagedController};
use libfuzzer_sys::fuzz_target;

// Arbitrary temperature/target sequences must never push power outside
// [0, max_power] or panic.
fuzz_target!(|data: &[u8]| {
    let mut c = StagedController::new(
        StagedCfg {
            t_overshoot_up: 8.0,
            coast_time_up: 12.0,
            t_overshoot_down: 4.0,
            coast_time_down: 6.0,
            ..StagedCfg::default()
        },
        PidCfg {
            gains: PidGains { kp: 0.08, ki: 0.004, kd: 0.4 },
            ..PidCfg::default()
        },
        FeedforwardCfg {
            params: FeedforwardParams { k_ss: 0.004, ..FeedforwardParams::default() },
            ..FeedforwardCfg::default()
        },
        Disturbances::default(),
        1.0,
    );
    let mut t = 0.0;
    for chunk in data.chunks_exact(2) {
        t += 0.5;
        let temp = f64::from(chunk[0]) * 1.2;
        let target = f64::from(chunk[1]);
        if let Ok(tick) = c.update(t, temp, target) {
            assert!((0.0..=1.0).contains(&tick.power));
        }
    }
});
