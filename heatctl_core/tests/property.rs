use heatctl_core::config::{FeedforwardCfg, FeedforwardParams, PidCfg, PidGains, StagedCfg};
use heatctl_core::feedforward::Disturbances;
use heatctl_core::{ControlState, Controller, PidBlock, PidController, StagedController};
use proptest::prelude::*;

prop_compose! {
    /// Temperature trace with bounded per-tick steps and occasional setpoint jumps.
    fn trace_strategy()(
        start in 0.0f64..300.0,
        steps in prop::collection::vec((-8.0f64..8.0, 0.1f64..2.0), 20..300),
    ) -> Vec<(f64, f64)> {
        let mut t = 0.0;
        let mut temp = start;
        steps
            .into_iter()
            .map(|(dtemp, dt)| {
                t += dt;
                temp = (temp + dtemp).clamp(-20.0, 400.0);
                (t, temp)
            })
            .collect()
    }
}

prop_compose! {
    fn gains_strategy()(
        kp in 0.0f64..1.0,
        ki in 0.0f64..0.1,
        kd in 0.0f64..2.0,
    ) -> PidGains {
        PidGains { kp, ki, kd }
    }
}

fn staged(gains: PidGains, max_power: f64, k_ss: f64, fb_enable: bool) -> StagedController {
    StagedController::new(
        StagedCfg {
            t_overshoot_up: 4.0,
            coast_time_up: 12.0,
            t_overshoot_down: 3.0,
            coast_time_down: 8.0,
            regulation_band: 6.0,
            min_duration: 4.0,
            fb_enable,
        },
        PidCfg {
            gains,
            min_deriv_time: 2.0,
        },
        FeedforwardCfg {
            params: FeedforwardParams {
                k_ss,
                k_fan: 0.1,
                k_ev: 0.02,
                dt_first_layer: 1.5,
            },
            ev_smoothing: 0.1,
        },
        Disturbances::default()
            .with_fan(|t: f64| (t / 50.0).sin().abs())
            .with_extruder_velocity(|t: f64| (t / 7.0).cos() * 10.0),
        max_power,
    )
}

proptest! {
    #[test]
    fn staged_output_is_always_within_bounds(
        trace in trace_strategy(),
        gains in gains_strategy(),
        max_power in 0.05f64..=1.0,
        k_ss in 0.0f64..0.02,
        fb_enable in any::<bool>(),
        target in prop::sample::select(vec![0.0, 60.0, 110.0, 215.0]),
    ) {
        let mut c = staged(gains, max_power, k_ss, fb_enable);
        for (t, temp) in trace {
            let tick = c.update(t, temp, target).unwrap();
            prop_assert!(tick.power >= 0.0 && tick.power <= max_power, "power {} out of [0, {}]", tick.power, max_power);
        }
    }

    #[test]
    fn pid_output_is_always_within_bounds(
        trace in trace_strategy(),
        gains in gains_strategy(),
        max_power in 0.05f64..=1.0,
        target in 0.0f64..300.0,
    ) {
        let mut c = PidController::new(PidCfg { gains, min_deriv_time: 2.0 }, max_power);
        for (t, temp) in trace {
            let tick = c.update(t, temp, target).unwrap();
            prop_assert!(tick.power >= 0.0 && tick.power <= max_power);
        }
    }

    #[test]
    fn integrator_never_grows_while_output_is_clamped(
        trace in trace_strategy(),
        gains in gains_strategy(),
        max_power in 0.05f64..=1.0,
        target in 0.0f64..300.0,
    ) {
        let mut pid = PidBlock::new(PidCfg { gains, min_deriv_time: 2.0 }, max_power);
        for (t, temp) in trace {
            let before = pid.integrator();
            let out = pid.update(t, temp, target).unwrap();
            if out.raw != out.bounded {
                prop_assert_eq!(pid.integrator(), before);
            }
            let limit = if gains.ki > 0.0 { max_power / gains.ki } else { 0.0 };
            prop_assert!(pid.integrator() >= 0.0 && pid.integrator() <= limit);
        }
    }

    #[test]
    fn coast_up_is_only_entered_from_max_power(
        trace in trace_strategy(),
        gains in gains_strategy(),
        target in prop::sample::select(vec![60.0, 110.0, 215.0]),
    ) {
        let mut c = staged(gains, 1.0, 0.004, true);
        for (t, temp) in trace {
            let before = c.state();
            c.update(t, temp, target).unwrap();
            if c.state() == ControlState::CoastUp && before != ControlState::CoastUp {
                prop_assert_eq!(before, ControlState::MaxPower);
            }
        }
    }

    #[test]
    fn entering_reset_states_clears_integrator(
        trace in trace_strategy(),
        gains in gains_strategy(),
        targets in prop::collection::vec(prop::sample::select(vec![0.0, 80.0, 200.0]), 1..6),
    ) {
        let mut c = staged(gains, 1.0, 0.004, true);
        for (i, (t, temp)) in trace.into_iter().enumerate() {
            let target = targets[i / 40 % targets.len()];
            let before = c.state();
            c.update(t, temp, target).unwrap();
            let now = c.state();
            if now != before
                && matches!(now, ControlState::Off | ControlState::CoastUp | ControlState::CoastDown)
            {
                prop_assert_eq!(c.pid().integrator(), 0.0);
            }
        }
    }
}
