//! Engine construction settings.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tactus_shared::ppqn::{Ppqn, QUARTER};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: f32,
    /// Beats counted in before recording starts.
    pub count_in_beats: u32,
    /// Interval between automation ticks.
    pub update_rate: Ppqn,
    /// Outbound notification queue length.
    pub notification_capacity: usize,
    /// Telemetry ring buffer length.
    pub telemetry_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            count_in_beats: 4,
            update_rate: QUARTER / 16.0,
            notification_capacity: 256,
            telemetry_capacity: 1024,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(8000.0..=384000.0).contains(&self.sample_rate) {
            return Err(EngineError::InvalidConfig(format!("sample rate {} out of range", self.sample_rate)));
        }
        if self.count_in_beats == 0 || self.count_in_beats > 16 {
            return Err(EngineError::InvalidConfig(format!("count-in of {} beats", self.count_in_beats)));
        }
        if !(self.update_rate > 0.0) {
            return Err(EngineError::InvalidConfig(format!("update rate {}", self.update_rate)));
        }
        if self.notification_capacity == 0 || self.telemetry_capacity == 0 {
            return Err(EngineError::InvalidConfig("queue capacities must be positive".to_string()));
        }
        Ok(())
    }
}

/// Which signal paths of an audio unit are rendered into its stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioUnitOptions {
    pub include_audio_effects: bool,
    pub include_sends: bool,
}

impl Default for AudioUnitOptions {
    fn default() -> Self {
        Self { include_audio_effects: true, include_sends: true }
    }
}

/// Stem export selection. Each listed audio unit is rendered into its own
/// output channel pair, in the order given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportConfiguration {
    pub stems: Vec<StemExport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemExport {
    pub unit: Uuid,
    #[serde(default)]
    pub options: AudioUnitOptions,
}

impl ExportConfiguration {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn options_for(&self, unit: Uuid) -> AudioUnitOptions {
        self.stems.iter().find(|stem| stem.unit == unit).map(|stem| stem.options).unwrap_or_default()
    }

    pub fn channel_count(&self) -> usize {
        self.stems.len() * 2
    }

    pub fn by_unit(&self) -> HashMap<Uuid, AudioUnitOptions> {
        self.stems.iter().map(|stem| (stem.unit, stem.options)).collect()
    }
}
