//! Name-indexed set of heater bindings.

use std::collections::BTreeMap;

use crate::binding::HeaterBinding;
use crate::error::ControlError;

#[derive(Debug, Default)]
pub struct HeaterRegistry {
    heaters: BTreeMap<String, HeaterBinding>,
}

impl HeaterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, binding: HeaterBinding) -> Result<(), ControlError> {
        let name = binding.name().to_string();
        if self.heaters.contains_key(&name) {
            return Err(ControlError::Config(format!(
                "heater '{name}' registered twice"
            )));
        }
        self.heaters.insert(name, binding);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&HeaterBinding, ControlError> {
        self.heaters
            .get(name)
            .ok_or_else(|| ControlError::Lookup(name.to_string()))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Result<&mut HeaterBinding, ControlError> {
        self.heaters
            .get_mut(name)
            .ok_or_else(|| ControlError::Lookup(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.heaters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.heaters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heaters.is_empty()
    }
}
