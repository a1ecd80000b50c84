pub mod audio_effects;
pub mod audio_unit;
pub mod block;
pub mod buffers;
pub mod clip_sequencer;
pub mod commands;
pub mod config;
pub mod delay;
pub mod engine; // Engine and its controller handle live here
pub mod error;
pub mod events;
pub mod export;
pub mod graph;
pub mod instruments;
pub mod metronome;
pub mod midi_effects;
pub mod mixer;
pub mod note_chain;
pub mod note_sequencer;
pub mod parameter;
pub mod processor;
pub mod renderer;
pub mod retainer;
pub mod samples;
pub mod telemetry;
pub mod time_info;
pub mod units;
pub mod update_clock;

#[cfg(test)]
mod tests_engine;

// Re-exports
pub use commands::{EngineCommand, EngineNotification};
pub use config::{AudioUnitOptions, EngineConfig, ExportConfiguration, StemExport};
pub use engine::{create, create_from_bytes, Engine, EngineHandle};
pub use error::{EngineError, Result};
pub use samples::SampleData;
pub use telemetry::TelemetryRecord;
