use crate::ppqn::Ppqn;
use crate::schema::{ByteReader, Field, Output, Schema};

/// Transport snapshot published by the engine once per render callback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineState {
    pub position: Ppqn,
    /// Where playback resumes after a stop.
    pub playback_timestamp: Ppqn,
    pub count_in_beats_total: i32,
    pub count_in_beats_remaining: f64,
    pub is_playing: bool,
    pub is_recording: bool,
    pub is_counting_in: bool,
}

impl Schema for EngineState {
    const FIELDS: &'static [Field] = &[
        Field::Double,
        Field::Double,
        Field::Int32,
        Field::Double,
        Field::Bool,
        Field::Bool,
        Field::Bool,
    ];

    fn write<O: Output>(&self, output: &mut O) {
        output.write_f64(self.position);
        output.write_f64(self.playback_timestamp);
        output.write_i32(self.count_in_beats_total);
        output.write_f64(self.count_in_beats_remaining);
        output.write_bool(self.is_playing);
        output.write_bool(self.is_recording);
        output.write_bool(self.is_counting_in);
    }

    fn read(&mut self, input: &mut ByteReader<'_>) {
        self.position = input.read_f64();
        self.playback_timestamp = input.read_f64();
        self.count_in_beats_total = input.read_i32();
        self.count_in_beats_remaining = input.read_f64();
        self.is_playing = input.read_bool();
        self.is_recording = input.read_bool();
        self.is_counting_in = input.read_bool();
    }
}

impl EngineState {
    /// Bytes an exchange region needs to carry this snapshot.
    pub fn region_size() -> usize {
        Self::FIELDS.iter().map(Field::size).sum::<usize>() + 1
    }
}
