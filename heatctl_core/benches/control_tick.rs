use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use heatctl_core::config::{FeedforwardCfg, FeedforwardParams, PidCfg, PidGains, StagedCfg};
use heatctl_core::feedforward::Disturbances;
use heatctl_core::{Controller, RelayAutotune, RelaySettings, StagedController};

// Synthetic hotend trace: slow sine around 200 with additive white noise
fn synth_trace(n: usize, noise_amp: f64, seed: u32) -> Vec<(f64, f64)> {
    let mut state = seed.max(1);
    let mut next_f64 = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        f64::from(x) / (f64::from(u32::MAX) + 1.0)
    };
    (0..n)
        .map(|i| {
            let t = i as f64 * 0.3;
            let temp = 200.0 + 6.0 * (t / 20.0).sin() + (next_f64() * 2.0 - 1.0) * noise_amp;
            (t, temp)
        })
        .collect()
}

fn staged() -> StagedController {
    StagedController::new(
        StagedCfg {
            t_overshoot_up: 3.0,
            coast_time_up: 10.0,
            t_overshoot_down: 3.0,
            coast_time_down: 10.0,
            regulation_band: 10.0,
            min_duration: 5.0,
            fb_enable: true,
        },
        PidCfg {
            gains: PidGains {
                kp: 0.05,
                ki: 0.0005,
                kd: 0.1,
            },
            min_deriv_time: 2.0,
        },
        FeedforwardCfg {
            params: FeedforwardParams {
                k_ss: 0.0035,
                k_fan: 0.06,
                k_ev: 0.01,
                dt_first_layer: 1.5,
            },
            ev_smoothing: 0.1,
        },
        Disturbances::default()
            .with_fan(|_t: f64| 0.5)
            .with_extruder_velocity(|t: f64| (t / 3.0).sin().abs() * 8.0),
        1.0,
    )
}

pub fn bench_control_tick(c: &mut Criterion) {
    let mut g = c.benchmark_group("control_tick");
    // Allow quick tweaking without CLI flags (Criterion 0.5):
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p heatctl_core --bench control_tick
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE")
        && let Ok(n) = ss.parse::<usize>()
    {
        g.sample_size(n.max(1));
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }

    let trace = synth_trace(20_000, 0.1, 0xC0FFEE);

    g.bench_function("staged_regulate", |b| {
        b.iter_batched(
            staged,
            |mut ctl| {
                for &(t, temp) in &trace {
                    black_box(ctl.update(black_box(t), black_box(temp), 200.0).ok());
                }
            },
            BatchSize::SmallInput,
        )
    });

    g.bench_function("relay_autotune", |b| {
        b.iter_batched(
            || {
                RelayAutotune::new(RelaySettings {
                    target: 200.0,
                    hysteresis: 5.0,
                    ambient: 20.0,
                    min_peaks: 12,
                    max_power: 1.0,
                    pwm_delay: 0.0,
                })
            },
            |mut tuner| {
                for &(t, temp) in &trace {
                    black_box(tuner.update(t, temp, 200.0).ok());
                }
                black_box(tuner.analyze().ok());
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(control, bench_control_tick);
criterion_main!(control);
