//! Parameter value mappings and automation lanes.

use crate::ppqn::Ppqn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one bindable parameter of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterAddress {
    pub device: Uuid,
    pub parameter: u16,
}

impl ParameterAddress {
    pub fn new(device: Uuid, parameter: u16) -> Self {
        Self { device, parameter }
    }
}

/// Maps between a parameter's unit-interval representation and its value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ValueMapping {
    Unipolar,
    Bipolar,
    Linear { min: f32, max: f32 },
    Exponential { min: f32, max: f32 },
    Decibel { min: f32, max: f32 },
    Integer { min: i32, max: i32 },
    Bool,
}

impl ValueMapping {
    /// Unit interval to value.
    pub fn y(&self, x: f32) -> f32 {
        let x = x.clamp(0.0, 1.0);
        match *self {
            ValueMapping::Unipolar => x,
            ValueMapping::Bipolar => x * 2.0 - 1.0,
            ValueMapping::Linear { min, max } | ValueMapping::Decibel { min, max } => min + (max - min) * x,
            ValueMapping::Exponential { min, max } => min * (max / min).powf(x),
            ValueMapping::Integer { min, max } => (min as f32 + ((max - min) as f32 * x).round()).clamp(min as f32, max as f32),
            ValueMapping::Bool => {
                if x >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Value to unit interval.
    pub fn x(&self, y: f32) -> f32 {
        let x = match *self {
            ValueMapping::Unipolar => y,
            ValueMapping::Bipolar => (y + 1.0) * 0.5,
            ValueMapping::Linear { min, max } | ValueMapping::Decibel { min, max } => (y - min) / (max - min),
            ValueMapping::Exponential { min, max } => (y / min).ln() / (max / min).ln(),
            ValueMapping::Integer { min, max } => (y - min as f32) / (max - min).max(1) as f32,
            ValueMapping::Bool => {
                if y >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        };
        if x.is_finite() { x.clamp(0.0, 1.0) } else { 0.0 }
    }

    pub fn clamp(&self, y: f32) -> f32 {
        self.y(self.x(y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Interpolation {
    /// Hold the value until the next point.
    Step,
    #[default]
    Linear,
}

/// A point on an automation lane. `value` lives in the unit interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub position: Ppqn,
    pub value: f32,
    #[serde(default)]
    pub interpolation: Interpolation,
}

/// Automation for one parameter. Points are kept sorted by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationLane {
    pub target: ParameterAddress,
    pub points: Vec<ValuePoint>,
}

impl AutomationLane {
    pub fn new(target: ParameterAddress, mut points: Vec<ValuePoint>) -> Self {
        points.sort_by(|a, b| a.position.total_cmp(&b.position));
        Self { target, points }
    }

    /// Unit-interval value at `position`, or `None` for an empty lane.
    pub fn value_at(&self, position: Ppqn) -> Option<f32> {
        let first = self.points.first()?;
        if position <= first.position {
            return Some(first.value);
        }
        let index = self.points.partition_point(|point| point.position <= position);
        let left = &self.points[index - 1];
        let Some(right) = self.points.get(index) else {
            return Some(left.value);
        };
        match left.interpolation {
            Interpolation::Step => Some(left.value),
            Interpolation::Linear => {
                let ratio = ((position - left.position) / (right.position - left.position)) as f32;
                Some(left.value + (right.value - left.value) * ratio)
            }
        }
    }
}

/// Levels at or below this are silent.
pub const SILENCE_DB: f32 = -72.0;

pub fn db_to_gain(db: f32) -> f32 {
    if db <= SILENCE_DB { 0.0 } else { 10.0f32.powf(db / 20.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(position: Ppqn, value: f32, interpolation: Interpolation) -> ValuePoint {
        ValuePoint { position, value, interpolation }
    }

    #[test]
    fn test_mappings() {
        let db = ValueMapping::Decibel { min: -72.0, max: 12.0 };
        assert_eq!(db.y(0.0), -72.0);
        assert_eq!(db.y(1.0), 12.0);
        assert!((db.x(0.0) - 72.0 / 84.0).abs() < 1e-6);

        let exp = ValueMapping::Exponential { min: 20.0, max: 20000.0 };
        assert!((exp.y(0.5) - 632.455).abs() < 0.01);
        assert!((exp.x(exp.y(0.3)) - 0.3).abs() < 1e-5);

        let int = ValueMapping::Integer { min: -3, max: 3 };
        assert_eq!(int.y(0.5), 0.0);
        assert_eq!(int.clamp(7.0), 3.0);

        assert_eq!(db_to_gain(SILENCE_DB), 0.0);
        assert_eq!(db_to_gain(0.0), 1.0);
        assert!((db_to_gain(-6.0) - 0.501).abs() < 1e-3);

        assert_eq!(ValueMapping::Bipolar.y(0.25), -0.5);
        assert_eq!(ValueMapping::Bool.y(0.7), 1.0);
    }

    #[test]
    fn test_lane_lookup() {
        let address = ParameterAddress::new(Uuid::nil(), 0);
        let lane = AutomationLane::new(
            address,
            vec![
                point(960.0, 1.0, Interpolation::Step),
                point(0.0, 0.0, Interpolation::Linear),
                point(1920.0, 0.5, Interpolation::Linear),
            ],
        );
        assert_eq!(lane.value_at(-10.0), Some(0.0));
        assert_eq!(lane.value_at(480.0), Some(0.5));
        assert_eq!(lane.value_at(960.0), Some(1.0));
        assert_eq!(lane.value_at(1500.0), Some(1.0));
        assert_eq!(lane.value_at(5000.0), Some(0.5));
        assert_eq!(AutomationLane::new(address, vec![]).value_at(0.0), None);
    }
}
