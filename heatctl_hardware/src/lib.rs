//! Simulated heater hardware.
//!
//! `SimulatedHeater` integrates a first-order-with-dead-time thermal plant
//! in virtual time: the plant advances whenever the control engine reads the
//! heater or commands it, so a whole calibration run can execute against a
//! `VirtualClock` without sleeping.

pub mod error;
pub mod noise;

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use heatctl_traits::{Heater, HeaterStatus, StatusProvider};

use crate::error::HwError;
use crate::noise::XorShift32;

/// Integration step of the plant model (s).
const SIM_STEP: f64 = 0.05;

/// A value shared between a simulation and whoever drives it, readable as a
/// disturbance provider.
#[derive(Debug, Clone, Default)]
pub struct SharedSignal(Rc<Cell<f64>>);

impl SharedSignal {
    pub fn new(value: f64) -> Self {
        Self(Rc::new(Cell::new(value)))
    }

    pub fn get(&self) -> f64 {
        self.0.get()
    }

    pub fn set(&self, value: f64) {
        self.0.set(value);
    }
}

impl StatusProvider for SharedSignal {
    fn value(&self, _eventtime: f64) -> f64 {
        self.get()
    }
}

/// Thermal plant: `tau dT/dt = ambient + gain*u(t - dead_time) - fan_cooling*fan - T`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantParams {
    pub ambient: f64,
    /// Steady-state rise (K) at full power.
    pub gain: f64,
    pub time_constant: f64,
    pub dead_time: f64,
    /// Steady-state drop (K) with the part-cooling fan at 100 %.
    pub fan_cooling: f64,
}

impl PlantParams {
    /// Temperature the plant settles at for constant power and fan.
    pub fn steady_state(&self, power: f64, fan: f64) -> f64 {
        self.ambient + self.gain * power - self.fan_cooling * fan
    }
}

pub struct SimulatedHeater {
    name: String,
    params: PlantParams,
    temperature: SharedSignal,
    fan: SharedSignal,
    target: SharedSignal,
    fault: Rc<Cell<bool>>,
    time: f64,
    applied: f64,
    pending: VecDeque<(f64, f64)>,
    max_power: f64,
    pwm_delay: f64,
    max_temp: f64,
    noise: f64,
    rng: XorShift32,
}

impl SimulatedHeater {
    pub fn new(name: &str, params: PlantParams, initial_temp: f64) -> Self {
        Self {
            name: name.to_string(),
            params,
            temperature: SharedSignal::new(initial_temp),
            fan: SharedSignal::new(0.0),
            target: SharedSignal::new(0.0),
            fault: Rc::new(Cell::new(false)),
            time: 0.0,
            applied: 0.0,
            pending: VecDeque::new(),
            max_power: 1.0,
            pwm_delay: 0.0,
            max_temp: 500.0,
            noise: 0.0,
            rng: XorShift32::new(0x5eed),
        }
    }

    pub fn with_max_power(mut self, max_power: f64) -> Self {
        self.max_power = max_power;
        self
    }

    pub fn with_pwm_delay(mut self, delay: f64) -> Self {
        self.pwm_delay = delay.max(0.0);
        self
    }

    /// Uniform measurement noise of the given amplitude (K).
    pub fn with_noise(mut self, amplitude: f64, seed: u32) -> Self {
        self.noise = amplitude.max(0.0);
        self.rng = XorShift32::new(seed);
        self
    }

    /// Readings above `limit` are reported as a sensor range error.
    pub fn with_max_temp(mut self, limit: f64) -> Self {
        self.max_temp = limit;
        self
    }

    /// Fan speed (0..1) feeding the plant's cooling term.
    pub fn with_fan(mut self, fan: SharedSignal) -> Self {
        self.fan = fan;
        self
    }

    /// True plant temperature, without measurement noise.
    pub fn temperature_handle(&self) -> SharedSignal {
        self.temperature.clone()
    }

    /// Last setpoint reported by the control engine.
    pub fn target_handle(&self) -> SharedSignal {
        self.target.clone()
    }

    /// Setting the flag makes every status read fail like an open thermistor.
    pub fn fault_handle(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.fault)
    }

    fn advance(&mut self, to: f64) {
        while self.time < to {
            while let Some(&(at, value)) = self.pending.front()
                && at <= self.time
            {
                self.applied = value;
                self.pending.pop_front();
            }
            let dt = (to - self.time).min(SIM_STEP);
            let steady = self.params.steady_state(self.applied, self.fan.get());
            let temp = self.temperature.get();
            let tau = self.params.time_constant.max(f64::EPSILON);
            self.temperature
                .set(steady + (temp - steady) * (-dt / tau).exp());
            self.time += dt;
        }
    }
}

impl Heater for SimulatedHeater {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(
        &mut self,
        eventtime: f64,
    ) -> Result<HeaterStatus, Box<dyn std::error::Error + Send + Sync>> {
        self.advance(eventtime);
        if self.fault.get() {
            return Err(Box::new(HwError::SensorFault(format!(
                "{}: thermistor open circuit",
                self.name
            ))));
        }
        let temperature = self.temperature.get() + self.rng.symmetric(self.noise);
        if temperature > self.max_temp {
            return Err(Box::new(HwError::OutOfRange {
                temp: temperature,
                limit: self.max_temp,
            }));
        }
        Ok(HeaterStatus {
            temperature,
            max_power: self.max_power,
        })
    }

    fn set_power(
        &mut self,
        read_time: f64,
        value: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !value.is_finite() {
            return Err(Box::new(HwError::InvalidCommand(value)));
        }
        self.advance(read_time);
        let effective = read_time + self.pwm_delay + self.params.dead_time;
        self.pending
            .push_back((effective, value.clamp(0.0, self.max_power)));
        tracing::trace!(heater = %self.name, read_time, value, effective, "sim power");
        Ok(())
    }

    fn set_target(&mut self, value: f64) {
        self.target.set(value);
    }

    fn pwm_delay(&self) -> f64 {
        self.pwm_delay
    }
}
