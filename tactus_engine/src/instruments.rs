//! Note-driven sound sources.

use crate::block::Block;
use crate::buffers::{BufferId, EventInputId};
use crate::commands::EngineNotification;
use crate::events::{Event, NoteId};
use crate::parameter::Parameters;
use crate::processor::{AudioProcessor, ProcessContext};
use std::f32::consts::PI;
use tactus_shared::project::{InstrumentKind, InstrumentModel, Waveform};
use tactus_shared::value::db_to_gain;
use tactus_shared::{ParameterAddress, Ppqn, ValueMapping};
use uuid::Uuid;

pub const SYNTH_VOLUME: u16 = 0;
pub const SYNTH_ATTACK: u16 = 1;
pub const SYNTH_RELEASE: u16 = 2;
pub const SYNTH_WAVEFORM: u16 = 3;

pub const SAMPLER_VOLUME: u16 = 0;

const VOICE_GAIN: f32 = 0.25;
const SAMPLER_FADE_SECONDS: f32 = 0.005;
const SYNTH_MAX_VOICES: usize = 32;
const SAMPLER_MAX_VOICES: usize = 16;

fn note_frequency(pitch: u8, cent: f32) -> f32 {
    440.0 * 2.0f32.powf((pitch as f32 - 69.0 + cent / 100.0) / 12.0)
}

pub enum Instrument {
    Synth(Synth),
    Sampler(Sampler),
}

impl Instrument {
    pub fn create(model: &InstrumentModel, input: EventInputId, output: BufferId) -> Self {
        match &model.kind {
            InstrumentKind::Synth { waveform, volume_db, attack, release } => {
                Instrument::Synth(Synth::new(model.uuid, input, output, *waveform, *volume_db, *attack, *release))
            }
            InstrumentKind::Sampler { sample, volume_db, root_key } => {
                Instrument::Sampler(Sampler::new(model.uuid, input, output, *sample, *volume_db, *root_key))
            }
        }
    }

    fn core(&self) -> &InstrumentCore {
        match self {
            Instrument::Synth(synth) => &synth.core,
            Instrument::Sampler(sampler) => &sampler.core,
        }
    }

    fn core_mut(&mut self) -> &mut InstrumentCore {
        match self {
            Instrument::Synth(synth) => &mut synth.core,
            Instrument::Sampler(sampler) => &mut sampler.core,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.core().uuid
    }

    pub fn output(&self) -> BufferId {
        self.core().output
    }

    pub fn input(&self) -> EventInputId {
        self.core().input
    }

    /// Connects the unit's note chain. An instrument accepts a single source.
    pub fn attach_note_source(&mut self, source: Uuid) {
        let core = self.core_mut();
        assert!(
            core.note_source.is_none(),
            "instrument {} already has note source {:?}",
            core.uuid,
            core.note_source
        );
        core.note_source = Some(source);
    }

    pub fn detach_note_source(&mut self) {
        self.core_mut().note_source = None;
    }

    pub fn set_parameter(&mut self, index: u16, value: f32) -> bool {
        let applied = self.core_mut().parameters.set(index, value);
        if let Instrument::Synth(synth) = self {
            synth.read_parameters();
        }
        applied
    }

    pub fn active_voices(&self) -> usize {
        match self {
            Instrument::Synth(synth) => synth.voices.len(),
            Instrument::Sampler(sampler) => sampler.voices.len(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            Instrument::Synth(synth) => synth.voices.clear(),
            Instrument::Sampler(sampler) => sampler.voices.clear(),
        }
    }
}

impl AudioProcessor for Instrument {
    fn event_input(&self) -> Option<EventInputId> {
        Some(self.core().input)
    }

    fn handle_event(&mut self, ctx: &mut ProcessContext, _block: &Block, event: &Event) {
        match self {
            Instrument::Synth(synth) => synth.handle_event(ctx, event),
            Instrument::Sampler(sampler) => sampler.handle_event(event),
        }
    }

    fn update_parameter(&mut self, ctx: &mut ProcessContext, position: Ppqn) {
        if self.core_mut().parameters.update(ctx.project, position) {
            if let Instrument::Synth(synth) = self {
                synth.read_parameters();
            }
        }
    }

    fn process_audio(&mut self, ctx: &mut ProcessContext, _block: &Block, from: usize, to: usize) {
        match self {
            Instrument::Synth(synth) => synth.render(ctx, from, to),
            Instrument::Sampler(sampler) => sampler.render(ctx, from, to),
        }
    }
}

struct InstrumentCore {
    uuid: Uuid,
    input: EventInputId,
    output: BufferId,
    parameters: Parameters,
    note_source: Option<Uuid>,
}

struct SynthVoice {
    id: NoteId,
    phase: f32,
    frequency: f32,
    velocity: f32,
    envelope: f32,
    releasing: bool,
}

/// Polyphonic oscillator with a linear attack/release envelope.
pub struct Synth {
    core: InstrumentCore,
    voices: Vec<SynthVoice>,
    waveform: Waveform,
    gain: f32,
    attack: f32,
    release: f32,
}

impl Synth {
    pub fn new(
        uuid: Uuid,
        input: EventInputId,
        output: BufferId,
        waveform: Waveform,
        volume_db: f32,
        attack: f32,
        release: f32,
    ) -> Self {
        let parameters = Parameters::new()
            .bind(ParameterAddress::new(uuid, SYNTH_VOLUME), ValueMapping::Decibel { min: -72.0, max: 12.0 }, volume_db)
            .bind(ParameterAddress::new(uuid, SYNTH_ATTACK), ValueMapping::Exponential { min: 0.001, max: 5.0 }, attack)
            .bind(ParameterAddress::new(uuid, SYNTH_RELEASE), ValueMapping::Exponential { min: 0.001, max: 5.0 }, release)
            .bind(ParameterAddress::new(uuid, SYNTH_WAVEFORM), ValueMapping::Integer { min: 0, max: 2 }, waveform.index());
        let mut synth = Self {
            core: InstrumentCore { uuid, input, output, parameters, note_source: None },
            voices: Vec::with_capacity(SYNTH_MAX_VOICES),
            waveform,
            gain: 1.0,
            attack: 0.0,
            release: 0.0,
        };
        synth.read_parameters();
        synth
    }

    fn read_parameters(&mut self) {
        let parameters = &self.core.parameters;
        self.gain = db_to_gain(parameters.get(SYNTH_VOLUME));
        self.attack = parameters.get(SYNTH_ATTACK);
        self.release = parameters.get(SYNTH_RELEASE);
        self.waveform = Waveform::from_index(parameters.get(SYNTH_WAVEFORM));
    }

    fn handle_event(&mut self, ctx: &mut ProcessContext, event: &Event) {
        match event {
            Event::NoteStart(note) => {
                // steal the oldest releasing voice, else the oldest
                if self.voices.len() == SYNTH_MAX_VOICES {
                    let index = self.voices.iter().position(|voice| voice.releasing).unwrap_or(0);
                    self.voices.remove(index);
                }
                self.voices.push(SynthVoice {
                    id: note.id,
                    phase: 0.0,
                    frequency: note_frequency(note.pitch, note.cent) / ctx.sample_rate,
                    velocity: note.velocity,
                    envelope: 0.0,
                    releasing: false,
                })
            }
            Event::NoteStop { id, .. } => {
                if let Some(voice) = self.voices.iter_mut().find(|voice| voice.id == *id) {
                    voice.releasing = true;
                }
            }
            Event::Update { .. } | Event::Controller { .. } => {}
        }
    }

    fn render(&mut self, ctx: &mut ProcessContext, from: usize, to: usize) {
        let (left, right) = ctx.audio.get_mut(self.core.output).channels_mut();
        left[from..to].fill(0.0);
        right[from..to].fill(0.0);
        let attack_step = 1.0 / (self.attack * ctx.sample_rate).max(1.0);
        let release_step = 1.0 / (self.release * ctx.sample_rate).max(1.0);
        let waveform = self.waveform;
        for voice in self.voices.iter_mut() {
            for i in from..to {
                if voice.releasing {
                    voice.envelope = (voice.envelope - release_step).max(0.0);
                } else {
                    voice.envelope = (voice.envelope + attack_step).min(1.0);
                }
                let s = match waveform {
                    Waveform::Sine => (voice.phase * 2.0 * PI).sin(),
                    Waveform::Saw => voice.phase * 2.0 - 1.0,
                    Waveform::Square => {
                        if voice.phase < 0.5 {
                            1.0
                        } else {
                            -1.0
                        }
                    }
                };
                let s = s * voice.envelope * voice.velocity * self.gain * VOICE_GAIN;
                left[i] += s;
                right[i] += s;
                voice.phase = (voice.phase + voice.frequency) % 1.0;
            }
        }
        self.voices.retain(|voice| !(voice.releasing && voice.envelope <= 0.0));
    }
}

struct SamplerVoice {
    id: NoteId,
    position: f64,
    ratio: f64,
    velocity: f32,
    fade: f32,
    releasing: bool,
}

/// Plays one sample, repitched relative to its root key.
pub struct Sampler {
    core: InstrumentCore,
    voices: Vec<SamplerVoice>,
    sample: Uuid,
    root_key: u8,
    requested: bool,
}

impl Sampler {
    pub fn new(uuid: Uuid, input: EventInputId, output: BufferId, sample: Uuid, volume_db: f32, root_key: u8) -> Self {
        let parameters = Parameters::new().bind(
            ParameterAddress::new(uuid, SAMPLER_VOLUME),
            ValueMapping::Decibel { min: -72.0, max: 12.0 },
            volume_db,
        );
        Self {
            core: InstrumentCore { uuid, input, output, parameters, note_source: None },
            voices: Vec::with_capacity(SAMPLER_MAX_VOICES),
            sample,
            root_key,
            requested: false,
        }
    }

    fn handle_event(&mut self, event: &Event) {
        match event {
            Event::NoteStart(note) => {
                if self.voices.len() == SAMPLER_MAX_VOICES {
                    let index = self.voices.iter().position(|voice| voice.releasing).unwrap_or(0);
                    self.voices.remove(index);
                }
                self.voices.push(SamplerVoice {
                    id: note.id,
                    position: 0.0,
                    ratio: 2.0f64.powf((note.pitch as f64 - self.root_key as f64 + note.cent as f64 / 100.0) / 12.0),
                    velocity: note.velocity,
                    fade: 1.0,
                    releasing: false,
                })
            }
            Event::NoteStop { id, .. } => {
                if let Some(voice) = self.voices.iter_mut().find(|voice| voice.id == *id) {
                    voice.releasing = true;
                }
            }
            Event::Update { .. } | Event::Controller { .. } => {}
        }
    }

    fn render(&mut self, ctx: &mut ProcessContext, from: usize, to: usize) {
        let output = ctx.audio.get_mut(self.core.output);
        output.clear_range(from, to);
        let Some(data) = ctx.samples.get(self.sample) else {
            if !self.requested {
                self.requested = true;
                ctx.notifier.send(EngineNotification::FetchSample(self.sample));
            }
            return;
        };
        let frames = data.frames();
        let rate = data.sample_rate as f64 / ctx.sample_rate as f64;
        let gain = db_to_gain(self.core.parameters.get(SAMPLER_VOLUME));
        let fade_step = 1.0 / (SAMPLER_FADE_SECONDS * ctx.sample_rate).max(1.0);
        let (left, right) = output.channels_mut();
        for voice in self.voices.iter_mut() {
            for i in from..to {
                let index = voice.position as usize;
                if index + 1 >= frames {
                    voice.fade = 0.0;
                    break;
                }
                if voice.releasing {
                    voice.fade = (voice.fade - fade_step).max(0.0);
                }
                let alpha = (voice.position - index as f64) as f32;
                let amp = voice.velocity * voice.fade * gain;
                let l = data.frame(0, index) * (1.0 - alpha) + data.frame(0, index + 1) * alpha;
                let r = data.frame(1, index) * (1.0 - alpha) + data.frame(1, index + 1) * alpha;
                left[i] += l * amp;
                right[i] += r * amp;
                voice.position += voice.ratio * rate;
            }
        }
        self.voices.retain(|voice| voice.fade > 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::ProcessInfo;
    use crate::events::NoteEvent;
    use crate::processor::harness::{block, Harness};
    use crate::samples::{SampleData, SamplePool, SampleStore};

    fn start(id: NoteId, position: Ppqn, pitch: u8) -> Event {
        Event::NoteStart(NoteEvent { id, position, duration: 100.0, pitch, velocity: 1.0, cent: 0.0 })
    }

    fn synth(harness: &mut Harness, attack: f32, release: f32) -> Instrument {
        let input = harness.events.allocate();
        let output = harness.audio.allocate();
        Instrument::Synth(Synth::new(Uuid::new_v4(), input, output, Waveform::Square, 0.0, attack, release))
    }

    #[test]
    fn test_note_start_is_sample_accurate() {
        let mut harness = Harness::new();
        let mut instrument = synth(&mut harness, 0.001, 0.001);
        // 16 samples per pulse
        harness.events.get_mut(instrument.input()).add(0, start(1, 4.0, 69));
        let info = ProcessInfo { blocks: vec![block(0, 0.0, 0, 128)] };
        instrument.process(&mut harness.context(), &info);

        let left = harness.audio.get(instrument.output()).left();
        assert!(left[..64].iter().all(|s| *s == 0.0));
        assert!(left[64] > 0.0);
        assert_eq!(instrument.active_voices(), 1);
    }

    #[test]
    fn test_release_frees_voice() {
        let mut harness = Harness::new();
        let mut instrument = synth(&mut harness, 0.001, 0.001);
        let input = instrument.input();
        harness.events.get_mut(input).add(0, start(7, 0.0, 60));
        harness.events.get_mut(input).add(0, Event::NoteStop { id: 7, pitch: 60, position: 1.0 });
        let info = ProcessInfo { blocks: vec![block(0, 0.0, 0, 128)] };
        instrument.process(&mut harness.context(), &info);
        // the release completes within the block
        assert_eq!(instrument.active_voices(), 0);
        assert_eq!(harness.audio.get(instrument.output()).left()[127], 0.0);
    }

    #[test]
    fn test_voice_count_is_capped() {
        let mut harness = Harness::new();
        let mut instrument = synth(&mut harness, 0.001, 1.0);
        let input = instrument.input();
        for id in 0..40 {
            harness.events.get_mut(input).add(0, start(id, 0.0, 60 + (id % 12) as u8));
        }
        harness.events.get_mut(input).add(0, Event::NoteStop { id: 39, pitch: 63, position: 1.0 });
        let info = ProcessInfo { blocks: vec![block(0, 0.0, 0, 128)] };
        instrument.process(&mut harness.context(), &info);
        assert_eq!(instrument.active_voices(), SYNTH_MAX_VOICES);

        // a releasing voice is stolen before a sounding one
        harness.events.get_mut(input).add(0, start(40, 8.0, 60));
        let info = ProcessInfo { blocks: vec![block(0, 8.0, 0, 128)] };
        instrument.process(&mut harness.context(), &info);
        let Instrument::Synth(synth) = &instrument else { unreachable!() };
        assert_eq!(synth.voices.len(), SYNTH_MAX_VOICES);
        assert!(synth.voices.iter().all(|voice| voice.id != 39));
        assert!(synth.voices.iter().any(|voice| voice.id == 8));
    }

    #[test]
    fn test_volume_parameter() {
        let mut harness = Harness::new();
        let mut instrument = synth(&mut harness, 0.001, 1.0);
        assert!(instrument.set_parameter(SYNTH_VOLUME, -72.0));
        harness.events.get_mut(instrument.input()).add(0, start(1, 0.0, 60));
        let info = ProcessInfo { blocks: vec![block(0, 0.0, 0, 128)] };
        instrument.process(&mut harness.context(), &info);
        assert_eq!(harness.audio.get(instrument.output()).peaks(), [0.0, 0.0]);
        assert!(!instrument.set_parameter(9, 0.0));
    }

    #[test]
    #[should_panic(expected = "already has note source")]
    fn test_second_note_source_is_fatal() {
        let mut harness = Harness::new();
        let mut instrument = synth(&mut harness, 0.01, 0.01);
        instrument.attach_note_source(Uuid::new_v4());
        instrument.attach_note_source(Uuid::new_v4());
    }

    #[test]
    fn test_sampler_waits_for_data() {
        let mut harness = Harness::new();
        let sample = Uuid::new_v4();
        let input = harness.events.allocate();
        let output = harness.audio.allocate();
        let mut instrument = Instrument::Sampler(Sampler::new(Uuid::new_v4(), input, output, sample, 0.0, 60));
        let info = ProcessInfo { blocks: vec![block(0, 0.0, 0, 128)] };

        harness.events.get_mut(input).add(0, start(1, 0.0, 60));
        instrument.process(&mut harness.context(), &info);
        instrument.process(&mut harness.context(), &info);
        assert_eq!(harness.audio.get(output).peaks(), [0.0, 0.0]);
        let fetches: Vec<_> = harness.notifications.try_iter().collect();
        assert_eq!(fetches, vec![EngineNotification::FetchSample(sample)]);

        let store = SampleStore::new();
        store.insert(sample, SampleData::new(48000, vec![vec![0.5; 1024]]));
        harness.samples = SamplePool::clone(&store.load());
        instrument.process(&mut harness.context(), &info);
        let left = harness.audio.get(output).left();
        assert!((left[0] - 0.5).abs() < 1e-6);
        assert!((left[127] - 0.5).abs() < 1e-6);
    }
}
