//! Test and helper mocks for heatctl_core

use std::cell::RefCell;
use std::rc::Rc;

use heatctl_traits::{Heater, HeaterStatus};

use crate::controller::{ControlTick, Controller};
use crate::error::ControlError;

/// Everything a `FakeHeater` was told, plus the knobs tests turn.
#[derive(Debug, Default)]
pub struct FakeHeaterLog {
    pub temperature: f64,
    pub max_power: f64,
    pub fail_status: bool,
    pub powers: Vec<(f64, f64)>,
    pub targets: Vec<f64>,
}

/// Heater collaborator reporting a scripted temperature and recording every
/// command it receives.
pub struct FakeHeater {
    name: String,
    log: Rc<RefCell<FakeHeaterLog>>,
}

impl FakeHeater {
    pub fn new(name: &str, temperature: f64) -> Self {
        Self {
            name: name.to_string(),
            log: Rc::new(RefCell::new(FakeHeaterLog {
                temperature,
                max_power: 1.0,
                ..FakeHeaterLog::default()
            })),
        }
    }

    /// Shared handle to the log; stays valid after the heater is boxed.
    pub fn log(&self) -> Rc<RefCell<FakeHeaterLog>> {
        Rc::clone(&self.log)
    }
}

impl Heater for FakeHeater {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(
        &mut self,
        _eventtime: f64,
    ) -> Result<HeaterStatus, Box<dyn std::error::Error + Send + Sync>> {
        let log = self.log.borrow();
        if log.fail_status {
            return Err(Box::new(std::io::Error::other("fake sensor offline")));
        }
        Ok(HeaterStatus {
            temperature: log.temperature,
            max_power: log.max_power,
        })
    }

    fn set_power(
        &mut self,
        read_time: f64,
        value: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.log.borrow_mut().powers.push((read_time, value));
        Ok(())
    }

    fn set_target(&mut self, value: f64) {
        self.log.borrow_mut().targets.push(value);
    }
}

/// Controller that always requests the same power; useful for exercising
/// bindings and schedulers without control dynamics.
#[derive(Debug, Clone)]
pub struct FixedPower {
    power: f64,
    settled: bool,
}

impl FixedPower {
    pub fn new(power: f64) -> Self {
        Self {
            power,
            settled: false,
        }
    }

    pub fn settled(mut self) -> Self {
        self.settled = true;
        self
    }
}

impl Controller for FixedPower {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn update(&mut self, _: f64, _: f64, _: f64) -> Result<ControlTick, ControlError> {
        Ok(ControlTick::power(self.power))
    }

    fn is_settled(&self, _: f64, _: f64, _: f64) -> bool {
        self.settled
    }
}
