//! Human-readable error descriptions, exit codes and structured JSON errors.

use heatctl_core::error::{AbortReason, BuildError, CalibrationFailure, ControlError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingHeater => {
                "What happened: No heater was provided to the control binding.\nLikely causes: The simulated heater failed to initialize or was not wired into the builder.\nHow to fix: Ensure the heater is created and passed via with_heater(...).".to_string()
            }
            BuildError::MissingController => {
                "What happened: No controller was provided to the control binding.\nLikely causes: The [[heater]] control mode could not be built.\nHow to fix: Check the heater's `control`, [heater.pid] and [heater.feedforward] tables.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/heatctl.toml for a sample."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<ControlError>() {
        return match ce {
            ControlError::Lookup(name) => format!(
                "What happened: No heater named '{name}' is configured.\nLikely causes: Typo in --heater, or the [[heater]] section is missing.\nHow to fix: Use one of the names listed by `heatctl self-check`."
            ),
            ControlError::Config(msg) => format!(
                "What happened: Configuration is invalid ({msg}).\nLikely causes: Missing file, TOML syntax error, or out-of-range values.\nHow to fix: Pass --config with a valid file; see etc/heatctl.toml for a sample."
            ),
            ControlError::Abort(AbortReason::Interrupted)
            | ControlError::Calibration(CalibrationFailure::Interrupted) => {
                "What happened: The run was interrupted before it finished.\nLikely causes: Ctrl-C or a shutdown request.\nHow to fix: Rerun and let it complete; the heater was returned to its previous controller.".to_string()
            }
            ControlError::Calibration(CalibrationFailure::Timeout) => {
                "What happened: Calibration exceeded its maximum duration.\nLikely causes: The heater cannot reach the calibration target, or the oscillation is very slow.\nHow to fix: Lower --target or raise autotune.max_duration_s.".to_string()
            }
            ControlError::Calibration(CalibrationFailure::InsufficientPeaks { found, required }) => format!(
                "What happened: The relay experiment produced {found} peaks, {required} are needed.\nLikely causes: The run ended early or the heater never crossed the hysteresis band.\nHow to fix: Raise autotune.max_duration_s or lower autotune.hysteresis."
            ),
            ControlError::Calibration(CalibrationFailure::GainProductTooLow { gain_product }) => format!(
                "What happened: The measured gain product ({gain_product:.3}) is too low to fit a model.\nLikely causes: Calibration target too close to ambient, or a wrong autotune.ambient.\nHow to fix: Calibrate at a higher target and check autotune.ambient."
            ),
            ControlError::Calibration(f) => format!(
                "What happened: Calibration failed ({f}).\nLikely causes: Noisy or irregular oscillation.\nHow to fix: Rerun with --write-file and inspect the relay samples."
            ),
            ControlError::HardwareFault(msg) => format!(
                "What happened: The heater reported a fault ({msg}).\nLikely causes: Open or shorted thermistor, or a reading out of range.\nHow to fix: Check the sensor; the heater was driven to zero power."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: calibration 3, interrupted 4, lookup 5, config 6, other 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(BuildError::InvalidConfig(_)) = err.downcast_ref::<BuildError>() {
        return 6;
    }
    match err.downcast_ref::<ControlError>() {
        Some(
            ControlError::Abort(AbortReason::Interrupted)
            | ControlError::Calibration(CalibrationFailure::Interrupted),
        ) => 4,
        Some(ControlError::Calibration(_)) => 3,
        Some(ControlError::Lookup(_)) => 5,
        Some(ControlError::Config(_)) => 6,
        _ => 1,
    }
}

/// Short machine-readable name for the error class.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(ce) = err.downcast_ref::<ControlError>() {
        return match ce {
            ControlError::Config(_) => "Config",
            ControlError::Lookup(_) => "Lookup",
            ControlError::NumericInstability { .. } => "NumericInstability",
            ControlError::Hardware(_) => "Hardware",
            ControlError::HardwareFault(_) => "HardwareFault",
            ControlError::State(_) => "State",
            ControlError::Abort(AbortReason::Interrupted)
            | ControlError::Calibration(CalibrationFailure::Interrupted) => "Interrupted",
            ControlError::Abort(AbortReason::Timeout) => "Timeout",
            ControlError::Calibration(_) => "Calibration",
            ControlError::Io(_) => "Io",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Build";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let details = match err.downcast_ref::<ControlError>() {
        Some(ControlError::Calibration(CalibrationFailure::InsufficientPeaks {
            found,
            required,
        })) => Some(json!({ "found": found, "required": required })),
        Some(ControlError::Calibration(CalibrationFailure::GainProductTooLow {
            gain_product,
        })) => Some(json!({ "gain_product": gain_product })),
        Some(ControlError::Lookup(name)) => Some(json!({ "heater": name })),
        _ => None,
    };

    let obj = if let Some(d) = details {
        json!({ "reason": reason_name(err), "details": d, "message": humanize(err) })
    } else {
        json!({ "reason": reason_name(err), "message": humanize(err) })
    };
    obj.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ControlError::Calibration(CalibrationFailure::Timeout), 3)]
    #[case(ControlError::Calibration(CalibrationFailure::Interrupted), 4)]
    #[case(ControlError::Abort(AbortReason::Interrupted), 4)]
    #[case(ControlError::Lookup("bed".into()), 5)]
    #[case(ControlError::Config("bad".into()), 6)]
    #[case(ControlError::HardwareFault("open".into()), 1)]
    fn exit_codes_are_stable(#[case] e: ControlError, #[case] code: i32) {
        assert_eq!(exit_code_for_error(&eyre::Report::new(e)), code);
    }

    #[test]
    fn invalid_build_config_maps_to_config_code() {
        let e = eyre::Report::new(BuildError::InvalidConfig("max_power must be in (0, 1]"));
        assert_eq!(exit_code_for_error(&e), 6);
        assert!(humanize(&e).contains("max_power"));
    }

    #[test]
    fn json_error_carries_peak_details() {
        let e = eyre::Report::new(ControlError::Calibration(
            CalibrationFailure::InsufficientPeaks {
                found: 3,
                required: 12,
            },
        ));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&e)).unwrap();
        assert_eq!(v["reason"], "Calibration");
        assert_eq!(v["details"]["found"], 3);
        assert!(v["message"].as_str().unwrap().contains("12 are needed"));
    }

    #[test]
    fn untyped_errors_fall_back_to_generic_text() {
        let e = eyre::eyre!("something odd");
        assert_eq!(exit_code_for_error(&e), 1);
        assert!(humanize(&e).contains("something odd"));
        assert_eq!(reason_name(&e), "Error");
    }
}
