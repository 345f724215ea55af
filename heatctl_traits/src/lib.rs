//! Collaborator interfaces for heater control.
//!
//! The control engine never talks to hardware or host objects directly; it is
//! handed implementations of these traits at construction time.

pub mod clock;

pub use clock::{Clock, MonotonicClock, VirtualClock};

/// Snapshot of a heater as reported by its collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaterStatus {
    /// Latest measured temperature.
    pub temperature: f64,
    /// Upper bound accepted by `Heater::set_power`.
    pub max_power: f64,
}

pub trait Heater {
    fn name(&self) -> &str;

    fn status(
        &mut self,
        eventtime: f64,
    ) -> Result<HeaterStatus, Box<dyn std::error::Error + Send + Sync>>;

    /// Drive the actuator; `value` is already bounded to `[0, max_power]`.
    fn set_power(
        &mut self,
        read_time: f64,
        value: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Informs the collaborator of a new setpoint (relay switching uses this).
    fn set_target(&mut self, value: f64);

    /// Delay between a power command and the actuator reacting, in seconds.
    fn pwm_delay(&self) -> f64 {
        0.0
    }
}

/// Read-only disturbance reading such as fan speed or extruder velocity.
pub trait StatusProvider {
    fn value(&self, eventtime: f64) -> f64;
}

impl<F> StatusProvider for F
where
    F: Fn(f64) -> f64,
{
    fn value(&self, eventtime: f64) -> f64 {
        self(eventtime)
    }
}
