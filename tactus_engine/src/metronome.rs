use crate::block::ProcessInfo;
use crate::buffers::AudioBuffer;
use std::f32::consts::PI;
use tactus_shared::ppqn::{self, fragments, QUARTER};
use tactus_shared::RENDER_QUANTUM;

const ATTACK_SECONDS: f32 = 0.002;
const RELEASE_SECONDS: f32 = 0.050;

struct Click {
    frequency: f32,
    position: usize,
    start_index: usize,
}

impl Click {
    /// Adds the click into `[start, end)`. True once it has decayed.
    fn process_add(&mut self, buffer: &mut AudioBuffer, start: usize, end: usize, sample_rate: f32) -> bool {
        let attack = (ATTACK_SECONDS * sample_rate).floor();
        let release = (RELEASE_SECONDS * sample_rate).floor();
        let (l, r) = buffer.channels_mut();
        for index in self.start_index.max(start)..end {
            let position = self.position as f32;
            let env = (position / attack).min(1.0 - (position - attack) / release);
            let amp = (position / sample_rate * 2.0 * PI * self.frequency).sin() * 0.25 * env * env;
            l[index] += amp;
            r[index] += amp;
            self.position += 1;
            if self.position as f32 > attack + release {
                return true;
            }
        }
        self.start_index = 0;
        false
    }
}

/// Quarter-note clicks, accented on the first beat of a bar.
pub struct Metronome {
    output: AudioBuffer,
    clicks: Vec<Click>,
}

impl Default for Metronome {
    fn default() -> Self {
        Self::new()
    }
}

impl Metronome {
    pub fn new() -> Self {
        Self { output: AudioBuffer::new(), clicks: Vec::with_capacity(4) }
    }

    pub fn output(&self) -> &AudioBuffer {
        &self.output
    }

    pub fn process(&mut self, info: &ProcessInfo, enabled: bool, sample_rate: f32) {
        for block in &info.blocks {
            if enabled && block.flags.transporting() {
                for fragment in fragments(block.p0, block.p1, QUARTER) {
                    let distance = ppqn::pulses_to_samples(fragment.position - block.p0, block.bpm, sample_rate as f64);
                    let start_index = block.s0 + distance.floor() as usize;
                    assert!(start_index < RENDER_QUANTUM, "click at {start_index} out of bounds");
                    let accent = ppqn::to_parts(fragment.position).beats == 0;
                    self.clicks.push(Click {
                        frequency: if accent { 880.0 } else { 440.0 },
                        position: 0,
                        start_index,
                    });
                }
            }
            self.output.clear_range(block.s0, block.s1);
            let output = &mut self.output;
            self.clicks.retain_mut(|click| !click.process_add(output, block.s0, block.s1, sample_rate));
        }
    }

    pub fn reset(&mut self) {
        self.clicks.clear();
        self.output.clear();
    }
}
