//! PID tuning rules.

use crate::config::PidGains;
use crate::fowdt::FowdtModel;

/// Tyreus-Luyben rule from the ultimate gain and period.
pub fn tyreus_luyben(ku: f64, tu: f64) -> PidGains {
    let kp = 0.31 * ku;
    let ti = 2.2 * tu;
    let td = tu / 6.3;
    PidGains {
        kp,
        ki: kp / ti,
        kd: kp * td,
    }
}

/// AMIGO rule from a fitted FOWDT model.
pub fn amigo(model: &FowdtModel) -> PidGains {
    let (k, tau, l) = (model.k, model.tau, model.dead_time);
    let kc = (0.2 + 0.45 * tau / l) / k;
    let ti = l * (0.4 * l + 0.8 * tau) / (l + 0.1 * tau);
    let td = 0.5 * l * tau / (0.3 * l + tau);
    tracing::debug!(kc, ti, td, "amigo tuning");
    PidGains {
        kp: kc,
        ki: kc / ti,
        kd: kc * td,
    }
}
