//! Offline rendering and WAV output.
//! Drives an engine without an audio device, as fast as it renders.

use crate::engine::Engine;
use anyhow::bail;
use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;
use std::path::{Path, PathBuf};
use tactus_shared::RENDER_QUANTUM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportBitDepth {
    Int16,
    Int24,
    Float32,
}

/// WAV writer settings.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub sample_rate: u32,
    pub bit_depth: ExportBitDepth,
    pub normalize: bool,
    /// TPDF dither when converting to integer samples.
    pub dither: bool,
    /// Extra time rendered after the requested length for delay tails.
    pub tail_seconds: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            bit_depth: ExportBitDepth::Int24,
            normalize: false,
            dither: true,
            tail_seconds: 2.0,
        }
    }
}

/// Planar output of an offline render, one vector per output channel.
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub channels: Vec<Vec<f32>>,
}

impl Rendered {
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Interleaves channel pair `index` (`2 * index`, `2 * index + 1`).
    pub fn stereo(&self, index: usize) -> Vec<f32> {
        let (Some(left), Some(right)) = (self.channels.get(index * 2), self.channels.get(index * 2 + 1)) else {
            return Vec::new();
        };
        left.iter().zip(right).flat_map(|(l, r)| [*l, *r]).collect()
    }

    pub fn stems(&self) -> Vec<Vec<f32>> {
        (0..self.channels.len() / 2).map(|index| self.stereo(index)).collect()
    }
}

/// Renders `seconds` of audio, rounded up to whole quanta.
pub fn render_offline(engine: &mut Engine, seconds: f64) -> Result<Rendered, anyhow::Error> {
    let quanta = (seconds * engine.sample_rate() as f64 / RENDER_QUANTUM as f64).ceil() as usize;
    let channel_count = engine.output_channels();
    let mut scratch = vec![[0.0f32; RENDER_QUANTUM]; channel_count];
    let mut rendered = Rendered {
        channels: (0..channel_count).map(|_| Vec::with_capacity(quanta * RENDER_QUANTUM)).collect(),
    };
    info!("rendering {quanta} quanta into {channel_count} channels");
    for quantum in 0..quanta {
        let mut outputs: Vec<&mut [f32]> = scratch.iter_mut().map(|channel| channel.as_mut_slice()).collect();
        if !engine.process(&mut outputs) {
            bail!("engine stopped after {quantum} of {quanta} quanta");
        }
        for (channel, data) in rendered.channels.iter_mut().zip(outputs.iter()) {
            channel.extend_from_slice(data);
        }
    }
    Ok(rendered)
}

/// Writes interleaved stereo audio to a WAV file.
pub fn write_wav(path: &Path, data: &[f32], config: &ExportConfig) -> Result<(), anyhow::Error> {
    let (bits_per_sample, sample_format) = match config.bit_depth {
        ExportBitDepth::Int16 => (16, SampleFormat::Int),
        ExportBitDepth::Int24 => (24, SampleFormat::Int),
        ExportBitDepth::Float32 => (32, SampleFormat::Float),
    };
    let spec = WavSpec { channels: 2, sample_rate: config.sample_rate, bits_per_sample, sample_format };
    let mut writer = WavWriter::create(path, spec)?;

    let gain = if config.normalize {
        1.0 / data.iter().fold(0.0f32, |max, s| max.max(s.abs())).max(1e-10)
    } else {
        1.0
    };
    // one generator per channel keeps the dither decorrelated
    let mut rngs = [fastrand::Rng::with_seed(0x5eed_0001), fastrand::Rng::with_seed(0x5eed_0002)];

    match config.bit_depth {
        ExportBitDepth::Float32 => {
            for sample in data {
                writer.write_sample(sample * gain)?;
            }
        }
        ExportBitDepth::Int16 | ExportBitDepth::Int24 => {
            let bits = bits_per_sample as u32;
            let scale = (1i64 << (bits - 1)) as f32 - 1.0;
            for (index, sample) in data.iter().enumerate() {
                let mut value = sample * gain;
                if config.dither {
                    value += tpdf_dither(&mut rngs[index % 2], bits);
                }
                let quantized = (value * scale).round().clamp(-(scale + 1.0), scale) as i32;
                if bits == 16 {
                    writer.write_sample(quantized as i16)?;
                } else {
                    writer.write_sample(quantized)?;
                }
            }
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Triangular noise of one LSB at `bits`.
fn tpdf_dither(rng: &mut fastrand::Rng, bits: u32) -> f32 {
    let lsb = 1.0 / (1u64 << (bits - 1)) as f32;
    (rng.f32() - rng.f32()) * lsb
}

/// Writes one file per stem into `output_dir`, named after the unit.
pub fn write_stems(
    output_dir: &Path,
    names: &[String],
    stems: &[Vec<f32>],
    config: &ExportConfig,
) -> Result<Vec<PathBuf>, anyhow::Error> {
    std::fs::create_dir_all(output_dir)?;
    let mut paths = Vec::with_capacity(stems.len());
    for (index, (name, data)) in names.iter().zip(stems).enumerate() {
        let safe = name.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        let filename = if safe.is_empty() {
            format!("stem_{:02}.wav", index + 1)
        } else {
            format!("{:02}_{safe}.wav", index + 1)
        };
        let path = output_dir.join(filename);
        write_wav(&path, data, config)?;
        paths.push(path);
    }
    Ok(paths)
}
