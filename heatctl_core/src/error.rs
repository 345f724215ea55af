use thiserror::Error;

/// Why a scheduler gave up waiting on a heater.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("interrupted by shutdown request")]
    Interrupted,
    #[error("maximum duration exceeded")]
    Timeout,
}

/// Reasons a relay calibration produced no usable model.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationFailure {
    #[error("insufficient oscillation peaks: found {found}, need {required}")]
    InsufficientPeaks { found: usize, required: usize },
    #[error("gain product K*Ku = {gain_product:.3} is not above 1; the relay test is unusable")]
    GainProductTooLow { gain_product: f64 },
    #[error("calibration interrupted before oscillation completed")]
    Interrupted,
    #[error("calibration exceeded its maximum duration")]
    Timeout,
    #[error("degenerate oscillation cycle: {0}")]
    DegenerateCycle(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown heater '{0}'")]
    Lookup(String),
    #[error("non-finite value in {stage}")]
    NumericInstability { stage: &'static str },
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("aborted: {0}")]
    Abort(AbortReason),
    #[error("calibration failed: {0}")]
    Calibration(CalibrationFailure),
    #[error("io error: {0}")]
    Io(String),
}

impl From<CalibrationFailure> for ControlError {
    fn from(value: CalibrationFailure) -> Self {
        Self::Calibration(value)
    }
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing heater")]
    MissingHeater,
    #[error("missing controller")]
    MissingController,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
