//! Summing, channel strips and aux sends.

use crate::block::{Block, ProcessInfo};
use crate::buffers::{BufferId, EventInputId};
use crate::parameter::Parameters;
use crate::processor::{AudioProcessor, ProcessContext};
use crate::telemetry::TelemetryRecord;
use tactus_shared::project::{AuxSendModel, ChannelStripModel};
use tactus_shared::value::db_to_gain;
use tactus_shared::{ParameterAddress, Ppqn, ValueMapping};
use uuid::Uuid;

pub const STRIP_VOLUME: u16 = 0;
pub const STRIP_PANNING: u16 = 1;
pub const STRIP_MUTE: u16 = 2;

pub const SEND_GAIN: u16 = 0;

/// Left/right gains for a volume and a panning in [-1, 1]. The centre
/// keeps both sides at full volume.
pub fn stereo_gains(volume: f32, pan: f32) -> (f32, f32) {
    let mut l_gain = volume;
    let mut r_gain = volume;
    if pan > 0.0 {
        l_gain *= 1.0 - pan;
    } else if pan < 0.0 {
        r_gain *= 1.0 + pan;
    }
    (l_gain, r_gain)
}

/// Sums every attached source. Used as the input of bus and output units.
pub struct AudioBus {
    unit: Uuid,
    output: BufferId,
    sources: Vec<BufferId>,
}

impl AudioBus {
    pub fn new(unit: Uuid, output: BufferId) -> Self {
        Self { unit, output, sources: Vec::new() }
    }

    pub fn unit(&self) -> Uuid {
        self.unit
    }

    pub fn output(&self) -> BufferId {
        self.output
    }

    pub fn add_source(&mut self, source: BufferId) {
        self.sources.push(source);
    }

    pub fn remove_source(&mut self, source: BufferId) {
        if let Some(index) = self.sources.iter().position(|candidate| *candidate == source) {
            self.sources.remove(index);
        }
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn process(&mut self, ctx: &mut ProcessContext, _info: &ProcessInfo) {
        ctx.audio.get_mut(self.output).clear();
        for source in &self.sources {
            let (source, output) = ctx.audio.pair_mut(*source, self.output);
            output.add_from(source, 0, tactus_shared::RENDER_QUANTUM, 1.0, 1.0);
        }
    }
}

/// Volume, panning and mute at the end of a unit's chain.
pub struct ChannelStrip {
    unit: Uuid,
    uuid: Uuid,
    input: EventInputId,
    output: BufferId,
    source: Option<BufferId>,
    parameters: Parameters,
    gains: (f32, f32),
    peaks: [f32; 2],
}

impl ChannelStrip {
    pub fn new(unit: Uuid, model: &ChannelStripModel, input: EventInputId, output: BufferId) -> Self {
        let parameters = Parameters::new()
            .bind(ParameterAddress::new(model.uuid, STRIP_VOLUME), ValueMapping::Decibel { min: -72.0, max: 12.0 }, model.volume_db)
            .bind(ParameterAddress::new(model.uuid, STRIP_PANNING), ValueMapping::Bipolar, model.panning)
            .bind(ParameterAddress::new(model.uuid, STRIP_MUTE), ValueMapping::Bool, if model.mute { 1.0 } else { 0.0 });
        let mut strip = Self {
            unit,
            uuid: model.uuid,
            input,
            output,
            source: None,
            parameters,
            gains: (1.0, 1.0),
            peaks: [0.0; 2],
        };
        strip.read_parameters();
        strip
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn output(&self) -> BufferId {
        self.output
    }

    pub fn set_source(&mut self, source: Option<BufferId>) {
        self.source = source;
    }

    pub fn set_parameter(&mut self, index: u16, value: f32) -> bool {
        let applied = self.parameters.set(index, value);
        self.read_parameters();
        applied
    }

    fn read_parameters(&mut self) {
        let mute = self.parameters.get(STRIP_MUTE) >= 0.5;
        let volume = if mute { 0.0 } else { db_to_gain(self.parameters.get(STRIP_VOLUME)) };
        self.gains = stereo_gains(volume, self.parameters.get(STRIP_PANNING));
    }

    pub fn reset(&mut self) {
        self.peaks = [0.0; 2];
    }
}

impl AudioProcessor for ChannelStrip {
    fn event_input(&self) -> Option<EventInputId> {
        Some(self.input)
    }

    fn introduce_block(&mut self, _ctx: &mut ProcessContext, block: &Block) {
        if block.s0 == 0 {
            self.peaks = [0.0; 2];
        }
    }

    fn update_parameter(&mut self, ctx: &mut ProcessContext, position: Ppqn) {
        if self.parameters.update(ctx.project, position) {
            self.read_parameters();
        }
    }

    fn process_audio(&mut self, ctx: &mut ProcessContext, _block: &Block, from: usize, to: usize) {
        let Some(source) = self.source else {
            ctx.audio.get_mut(self.output).clear_range(from, to);
            return;
        };
        let (source, output) = ctx.audio.pair_mut(source, self.output);
        output.clear_range(from, to);
        output.add_from(source, from, to, self.gains.0, self.gains.1);
        let (left, right) = output.channels_mut();
        for (peak, channel) in self.peaks.iter_mut().zip([&left[from..to], &right[from..to]]) {
            *peak = channel.iter().fold(*peak, |max, sample| max.max(sample.abs()));
        }
    }

    fn finish_process(&mut self, ctx: &mut ProcessContext) {
        ctx.telemetry.push(TelemetryRecord::ChannelPeaks { unit: self.unit, peaks: self.peaks });
    }
}

/// Copies its source, scaled by the send gain, into the output it lends to
/// a target bus.
pub struct AuxSend {
    uuid: Uuid,
    target: Uuid,
    input: EventInputId,
    output: BufferId,
    source: Option<BufferId>,
    parameters: Parameters,
}

impl AuxSend {
    pub fn new(model: &AuxSendModel, input: EventInputId, output: BufferId) -> Self {
        let parameters = Parameters::new().bind(
            ParameterAddress::new(model.uuid, SEND_GAIN),
            ValueMapping::Decibel { min: -72.0, max: 0.0 },
            model.send_db,
        );
        Self { uuid: model.uuid, target: model.target, input, output, source: None, parameters }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Audio unit whose bus receives this send.
    pub fn target(&self) -> Uuid {
        self.target
    }

    pub fn output(&self) -> BufferId {
        self.output
    }

    pub fn set_source(&mut self, source: Option<BufferId>) {
        self.source = source;
    }

    pub fn set_parameter(&mut self, index: u16, value: f32) -> bool {
        self.parameters.set(index, value)
    }
}

impl AudioProcessor for AuxSend {
    fn event_input(&self) -> Option<EventInputId> {
        Some(self.input)
    }

    fn update_parameter(&mut self, ctx: &mut ProcessContext, position: Ppqn) {
        self.parameters.update(ctx.project, position);
    }

    fn process_audio(&mut self, ctx: &mut ProcessContext, _block: &Block, from: usize, to: usize) {
        let Some(source) = self.source else {
            ctx.audio.get_mut(self.output).clear_range(from, to);
            return;
        };
        let gain = db_to_gain(self.parameters.get(SEND_GAIN));
        let (source, output) = ctx.audio.pair_mut(source, self.output);
        output.clear_range(from, to);
        output.add_from(source, from, to, gain, gain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::harness::{block, Harness};

    #[test]
    fn test_pan_law() {
        assert_eq!(stereo_gains(1.0, 0.0), (1.0, 1.0));
        assert_eq!(stereo_gains(0.5, 0.5), (0.25, 0.5));
        assert_eq!(stereo_gains(1.0, -1.0), (1.0, 0.0));
    }

    #[test]
    fn test_bus_sums_sources() {
        let mut harness = Harness::new();
        let a = harness.audio.allocate();
        let b = harness.audio.allocate();
        let out = harness.audio.allocate();
        harness.audio.get_mut(a).channels_mut().0.fill(0.25);
        harness.audio.get_mut(b).channels_mut().0.fill(0.5);
        let mut bus = AudioBus::new(Uuid::new_v4(), out);
        bus.add_source(a);
        bus.add_source(b);
        let info = ProcessInfo { blocks: vec![block(0, 0.0, 0, 128)] };
        bus.process(&mut harness.context(), &info);
        assert_eq!(harness.audio.get(out).left()[100], 0.75);

        bus.remove_source(a);
        assert_eq!(bus.source_count(), 1);
        bus.process(&mut harness.context(), &info);
        assert_eq!(harness.audio.get(out).left()[100], 0.5);
    }

    #[test]
    fn test_strip_gain_mute_and_peaks() {
        let mut harness = Harness::new();
        let source = harness.audio.allocate();
        let input = harness.events.allocate();
        let output = harness.audio.allocate();
        harness.audio.get_mut(source).channels_mut().0.fill(0.5);
        harness.audio.get_mut(source).channels_mut().1.fill(0.5);
        let unit = Uuid::new_v4();
        let model = ChannelStripModel { panning: 1.0, ..ChannelStripModel::default() };
        let mut strip = ChannelStrip::new(unit, &model, input, output);
        strip.set_source(Some(source));
        let info = ProcessInfo { blocks: vec![block(0, 0.0, 0, 128)] };

        strip.process(&mut harness.context(), &info);
        assert_eq!(harness.audio.get(output).peaks(), [0.0, 0.5]);
        assert_eq!(
            harness.telemetry_receiver.try_recv(),
            Some(TelemetryRecord::ChannelPeaks { unit, peaks: [0.0, 0.5] })
        );

        assert!(strip.set_parameter(STRIP_MUTE, 1.0));
        strip.process(&mut harness.context(), &info);
        assert_eq!(harness.audio.get(output).peaks(), [0.0, 0.0]);
    }

    #[test]
    fn test_send_gain() {
        let mut harness = Harness::new();
        let source = harness.audio.allocate();
        let input = harness.events.allocate();
        let output = harness.audio.allocate();
        harness.audio.get_mut(source).channels_mut().1.fill(1.0);
        let model = AuxSendModel { uuid: Uuid::new_v4(), target: Uuid::new_v4(), send_db: -6.0 };
        let mut send = AuxSend::new(&model, input, output);
        let info = ProcessInfo { blocks: vec![block(0, 0.0, 0, 128)] };

        send.process(&mut harness.context(), &info);
        assert_eq!(harness.audio.get(output).peaks(), [0.0, 0.0]);

        send.set_source(Some(source));
        send.process(&mut harness.context(), &info);
        assert!((harness.audio.get(output).right()[64] - 0.501).abs() < 1e-3);
        assert_eq!(send.target(), model.target);
    }
}
