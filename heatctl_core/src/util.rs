//! Shared numeric helpers for controllers and the relay tuner.

/// Temperature band (K) within which a heater counts as settled.
pub const SETTLE_DELTA: f64 = 1.0;
/// Rate of change (K/s) below which a heater counts as settled.
pub const SETTLE_SLOPE: f64 = 0.1;

/// Rate of change of temperature, low-pass filtered over at least
/// `min_deriv_time` seconds.
///
/// Intervals shorter than the window blend with the previous estimate so a
/// single noisy sample cannot dominate the derivative.
#[inline]
pub fn filtered_derivative(
    prev_deriv: f64,
    temp_diff: f64,
    time_diff: f64,
    min_deriv_time: f64,
) -> f64 {
    if time_diff >= min_deriv_time {
        temp_diff / time_diff
    } else {
        (prev_deriv * (min_deriv_time - time_diff) + temp_diff) / min_deriv_time
    }
}

/// First-order smoothing toward `sample`, saturating after `smooth_time`.
#[inline]
pub fn smooth_toward(current: f64, sample: f64, time_diff: f64, smooth_time: f64) -> f64 {
    let adj = if smooth_time > 0.0 {
        (time_diff.max(0.0) / smooth_time).min(1.0)
    } else {
        1.0
    };
    current + (sample - current) * adj
}

/// Settle rule shared by every controller that tracks a setpoint.
#[inline]
pub fn within_settle_band(smoothed_temp: f64, target_temp: f64, deriv: f64) -> bool {
    (target_temp - smoothed_temp).abs() <= SETTLE_DELTA && deriv.abs() <= SETTLE_SLOPE
}

/// Mean of a right-continuous step function over `[start, end]`.
///
/// `steps` holds `(time, value)` switch points in ascending time; the value
/// before the first switch is `initial`.
pub fn step_mean(steps: &[(f64, f64)], initial: f64, start: f64, end: f64) -> Option<f64> {
    let span = end - start;
    if span <= 0.0 {
        return None;
    }
    let mut value = initial;
    let mut cursor = start;
    let mut area = 0.0;
    for &(t, v) in steps {
        if t <= start {
            value = v;
            continue;
        }
        if t >= end {
            break;
        }
        area += value * (t - cursor);
        cursor = t;
        value = v;
    }
    area += value * (end - cursor);
    Some(area / span)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivative_uses_raw_slope_over_long_intervals() {
        assert_eq!(filtered_derivative(10.0, 6.0, 3.0, 2.0), 2.0);
    }

    #[test]
    fn derivative_blends_over_short_intervals() {
        // (1.0 * (2.0 - 0.5) + 1.0) / 2.0
        assert!((filtered_derivative(1.0, 1.0, 0.5, 2.0) - 1.25).abs() < 1e-12);
    }

    #[test]
    fn smoothing_saturates_after_smooth_time() {
        assert_eq!(smooth_toward(20.0, 30.0, 5.0, 1.0), 30.0);
        assert!((smooth_toward(20.0, 30.0, 0.5, 1.0) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn step_mean_integrates_switches_inside_window() {
        let steps = [(0.0, 1.0), (10.0, 0.0), (20.0, 1.0), (30.0, 0.0)];
        assert!((step_mean(&steps, 0.0, 0.0, 40.0).unwrap() - 0.5).abs() < 1e-12);
        assert!((step_mean(&steps, 0.0, 5.0, 15.0).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(step_mean(&steps, 0.0, 5.0, 5.0), None);
    }

    #[test]
    fn settle_band_requires_both_conditions() {
        assert!(within_settle_band(199.5, 200.0, 0.05));
        assert!(!within_settle_band(198.0, 200.0, 0.0));
        assert!(!within_settle_band(200.0, 200.0, 0.5));
    }
}
