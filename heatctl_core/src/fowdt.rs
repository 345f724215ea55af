//! First-order-with-dead-time process model fitted from a relay oscillation.
//!
//! For a relay of amplitude `d` producing an oscillation of amplitude `a`, the
//! describing-function approximation gives the ultimate gain
//! `Ku = 4d / (pi a)`. Given the ultimate period `Tu` and the static gain `K`,
//! the FOWDT parameters follow in closed form:
//!
//! ```text
//! omega_u = 2 pi / Tu
//! tau     = sqrt((K Ku)^2 - 1) / omega_u
//! L       = (pi - atan(omega_u tau)) / omega_u
//! ```

use std::f64::consts::PI;

use crate::error::CalibrationFailure;

/// Ultimate gain of a relay of amplitude `max_power` that drove an
/// oscillation with half peak-to-peak `amplitude`.
#[inline]
pub fn ultimate_gain(max_power: f64, amplitude: f64) -> f64 {
    4.0 * max_power / (PI * amplitude)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FowdtModel {
    /// Ultimate gain (actuation per K).
    pub ku: f64,
    /// Ultimate period (s).
    pub tu: f64,
    pub omega_u: f64,
    /// Static process gain (K per unit actuation).
    pub k: f64,
    /// Time constant (s).
    pub tau: f64,
    /// Dead time (s).
    pub dead_time: f64,
    /// Steady-state actuation per degree at the test temperature.
    pub kss: f64,
}

impl FowdtModel {
    pub fn from_ultimate(ku: f64, tu: f64, k: f64, kss: f64) -> Result<Self, CalibrationFailure> {
        if !(tu.is_finite() && tu > 0.0) {
            return Err(CalibrationFailure::DegenerateCycle("non-positive period"));
        }
        let omega_u = 2.0 * PI / tu;
        let gain_product = k * ku;
        if !(gain_product > 1.0) {
            return Err(CalibrationFailure::GainProductTooLow { gain_product });
        }
        let tau = (gain_product * gain_product - 1.0).sqrt() / omega_u;
        let dead_time = (PI - (omega_u * tau).atan()) / omega_u;
        if !(tau.is_finite() && dead_time.is_finite()) {
            return Err(CalibrationFailure::DegenerateCycle("non-finite model"));
        }
        Ok(Self {
            ku,
            tu,
            omega_u,
            k,
            tau,
            dead_time,
            kss,
        })
    }

    pub fn gain_product(&self) -> f64 {
        self.k * self.ku
    }
}
