use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("sensor fault: {0}")]
    SensorFault(String),
    #[error("temperature {temp:.1} outside sensor range (max {limit:.1})")]
    OutOfRange { temp: f64, limit: f64 },
    #[error("invalid power command: {0}")]
    InvalidCommand(f64),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
