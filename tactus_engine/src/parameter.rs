//! Bindable device parameters and their automation lookup.

use tactus_shared::{ParameterAddress, Ppqn, Project, ValueMapping};

#[derive(Debug, Clone, PartialEq)]
pub struct AutomatableParameter {
    address: ParameterAddress,
    mapping: ValueMapping,
    value: f32,
}

impl AutomatableParameter {
    pub fn new(address: ParameterAddress, mapping: ValueMapping, value: f32) -> Self {
        Self { address, mapping, value: mapping.clamp(value) }
    }

    pub fn address(&self) -> ParameterAddress {
        self.address
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    /// Value in the unit interval.
    pub fn unit_value(&self) -> f32 {
        self.mapping.x(self.value)
    }

    pub fn set_value(&mut self, value: f32) -> bool {
        let value = self.mapping.clamp(value);
        let changed = value != self.value;
        self.value = value;
        changed
    }

    /// Samples the parameter's automation lane at `position`, if it has one.
    pub fn update_automation(&mut self, project: &Project, position: Ppqn) -> bool {
        match project.lane(self.address).and_then(|lane| lane.value_at(position)) {
            Some(x) => {
                let value = self.mapping.y(x);
                let changed = value != self.value;
                self.value = value;
                changed
            }
            None => false,
        }
    }
}

/// The parameters of one device, indexed the same way as its addresses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    list: Vec<AutomatableParameter>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the next parameter. Declaration order defines the index.
    pub fn bind(mut self, address: ParameterAddress, mapping: ValueMapping, value: f32) -> Self {
        debug_assert_eq!(address.parameter as usize, self.list.len(), "parameters must be bound in index order");
        self.list.push(AutomatableParameter::new(address, mapping, value));
        self
    }

    pub fn get(&self, index: u16) -> f32 {
        self.list.get(index as usize).map_or(0.0, AutomatableParameter::value)
    }

    /// Automated value at `position`, or the current value without a lane.
    pub fn value_at(&self, project: &Project, index: u16, position: Ppqn) -> f32 {
        let Some(parameter) = self.list.get(index as usize) else {
            return 0.0;
        };
        project
            .lane(parameter.address)
            .and_then(|lane| lane.value_at(position))
            .map_or(parameter.value, |x| parameter.mapping.y(x))
    }

    pub fn parameter(&self, index: u16) -> Option<&AutomatableParameter> {
        self.list.get(index as usize)
    }

    /// Applies a value change. Returns false for unknown indices.
    pub fn set(&mut self, index: u16, value: f32) -> bool {
        match self.list.get_mut(index as usize) {
            Some(parameter) => {
                parameter.set_value(value);
                true
            }
            None => false,
        }
    }

    /// Re-samples every automated parameter. True if any value moved.
    pub fn update(&mut self, project: &Project, position: Ppqn) -> bool {
        let mut changed = false;
        for parameter in self.list.iter_mut() {
            changed |= parameter.update_automation(project, position);
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}
