//! Insert effects of an audio unit's chain.

use crate::block::Block;
use crate::buffers::{BufferId, EventInputId};
use crate::delay::DelayLine;
use crate::midi_effects::{rate_to_pulses, RATE_FRACTIONS};
use crate::mixer::stereo_gains;
use crate::parameter::Parameters;
use crate::processor::{AudioProcessor, ProcessContext};
use tactus_shared::ppqn::pulses_to_samples;
use tactus_shared::project::{AudioEffectKind, AudioEffectModel};
use tactus_shared::value::db_to_gain;
use tactus_shared::{ParameterAddress, Ppqn, ValueMapping, RENDER_QUANTUM};
use uuid::Uuid;

pub const STEREO_VOLUME: u16 = 0;
pub const STEREO_PANNING: u16 = 1;

pub const DELAY_TIME: u16 = 0;
pub const DELAY_FEEDBACK: u16 = 1;
pub const DELAY_WET: u16 = 2;

const MAX_DELAY_SECONDS: f32 = 8.0;

pub struct AudioEffect {
    uuid: Uuid,
    input: EventInputId,
    output: BufferId,
    source: Option<BufferId>,
    parameters: Parameters,
    kind: EffectKind,
}

enum EffectKind {
    StereoTool { gains: (f32, f32) },
    Delay(Box<Delay>),
}

struct Delay {
    lines: [DelayLine; 2],
    scratch: [f32; RENDER_QUANTUM],
}

impl AudioEffect {
    pub fn create(model: &AudioEffectModel, input: EventInputId, output: BufferId, sample_rate: f32) -> Self {
        let uuid = model.uuid;
        let (parameters, kind) = match &model.kind {
            AudioEffectKind::StereoTool { volume_db, panning } => (
                Parameters::new()
                    .bind(ParameterAddress::new(uuid, STEREO_VOLUME), ValueMapping::Decibel { min: -72.0, max: 12.0 }, *volume_db)
                    .bind(ParameterAddress::new(uuid, STEREO_PANNING), ValueMapping::Bipolar, *panning),
                EffectKind::StereoTool { gains: (1.0, 1.0) },
            ),
            AudioEffectKind::Delay { delay, feedback, wet } => {
                let max = (MAX_DELAY_SECONDS * sample_rate) as usize;
                (
                    Parameters::new()
                        .bind(
                            ParameterAddress::new(uuid, DELAY_TIME),
                            ValueMapping::Integer { min: 0, max: RATE_FRACTIONS.len() as i32 - 1 },
                            *delay as f32,
                        )
                        .bind(ParameterAddress::new(uuid, DELAY_FEEDBACK), ValueMapping::Unipolar, *feedback)
                        .bind(ParameterAddress::new(uuid, DELAY_WET), ValueMapping::Unipolar, *wet),
                    EffectKind::Delay(Box::new(Delay {
                        lines: [DelayLine::new(max), DelayLine::new(max)],
                        scratch: [0.0; RENDER_QUANTUM],
                    })),
                )
            }
        };
        let mut effect = Self { uuid, input, output, source: None, parameters, kind };
        effect.read_parameters();
        effect
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
        if let EffectKind::StereoTool { gains } = &mut self.kind {
            *gains = stereo_gains(
                db_to_gain(self.parameters.get(STEREO_VOLUME)),
                self.parameters.get(STEREO_PANNING),
            );
        }
    }

    pub fn reset(&mut self) {
        if let EffectKind::Delay(delay) = &mut self.kind {
            delay.lines.iter_mut().for_each(DelayLine::clear);
        }
    }
}

impl AudioProcessor for AudioEffect {
    fn event_input(&self) -> Option<EventInputId> {
        Some(self.input)
    }

    fn update_parameter(&mut self, ctx: &mut ProcessContext, position: Ppqn) {
        if self.parameters.update(ctx.project, position) {
            self.read_parameters();
        }
    }

    fn process_audio(&mut self, ctx: &mut ProcessContext, block: &Block, from: usize, to: usize) {
        let Some(source) = self.source else {
            ctx.audio.get_mut(self.output).clear_range(from, to);
            return;
        };
        let (source, output) = ctx.audio.pair_mut(source, self.output);
        match &mut self.kind {
            EffectKind::StereoTool { gains } => {
                output.clear_range(from, to);
                output.add_from(source, from, to, gains.0, gains.1);
            }
            EffectKind::Delay(delay) => {
                let pulses = rate_to_pulses(self.parameters.get(DELAY_TIME) as usize);
                let samples = pulses_to_samples(pulses, block.bpm, ctx.sample_rate as f64).round() as usize;
                let feedback = self.parameters.get(DELAY_FEEDBACK);
                let wet = self.parameters.get(DELAY_WET);
                let Delay { lines, scratch } = &mut **delay;
                let (out_l, out_r) = output.channels_mut();
                for (line, (src, out)) in lines.iter_mut().zip([(source.left(), out_l), (source.right(), out_r)]) {
                    let delayed = &mut scratch[from..to];
                    line.process(&src[from..to], delayed, samples, feedback);
                    for ((y, x), d) in out[from..to].iter_mut().zip(&src[from..to]).zip(delayed.iter()) {
                        *y = x * (1.0 - wet) + d * wet;
                    }
                }
            }
        }
    }
}
