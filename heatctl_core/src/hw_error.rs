//! Maps `Box<dyn Error>` from trait boundaries to typed `ControlError`.
//!
//! The traits in `heatctl_traits` use `Box<dyn Error + Send + Sync>` so any
//! sensor or output backend can plug in; this module converts those to our
//! typed error enum, with an optional feature-gated path for
//! `heatctl_hardware::HwError` downcasting.

use crate::error::ControlError;

/// Map a trait-boundary error to a typed `ControlError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ControlError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<heatctl_hardware::error::HwError>() {
            return match hw {
                heatctl_hardware::error::HwError::SensorFault(_)
                | heatctl_hardware::error::HwError::OutOfRange { .. } => {
                    ControlError::HardwareFault(hw.to_string())
                }
                other => ControlError::Hardware(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("fault") {
        ControlError::HardwareFault(s)
    } else {
        ControlError::Hardware(s)
    }
}
