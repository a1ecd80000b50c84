//! Sample data shared with the audio thread.
//!
//! The controller decodes files and publishes a new pool snapshot; the audio
//! thread only ever loads the current snapshot.

use arc_swap::ArcSwap;
use log::info;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Decoded audio, channels stored planar.
#[derive(Debug, Clone)]
pub struct SampleData {
    pub sample_rate: u32,
    pub channels: Arc<Vec<Vec<f32>>>,
}

impl SampleData {
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self { sample_rate, channels: Arc::new(channels) }
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Sample of `channel` at frame `index`, mono sources feeding both sides.
    pub fn frame(&self, channel: usize, index: usize) -> f32 {
        let count = self.channels.len();
        if count == 0 {
            return 0.0;
        }
        self.channels[channel.min(count - 1)].get(index).copied().unwrap_or(0.0)
    }

    /// Decodes a WAV file. Integer formats are scaled to [-1, 1].
    pub fn load_wav(path: &Path) -> Result<Self, anyhow::Error> {
        let reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let max_val = 2.0_f32.powi(spec.bits_per_sample as i32 - 1);
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max_val))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        let count = spec.channels.max(1) as usize;
        let mut channels = vec![Vec::with_capacity(interleaved.len() / count); count];
        for frame in interleaved.chunks_exact(count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        info!("loaded {} ({} frames, {} Hz)", path.display(), channels[0].len(), spec.sample_rate);
        Ok(Self::new(spec.sample_rate, channels))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SamplePool {
    samples: HashMap<Uuid, SampleData>,
}

impl SamplePool {
    pub fn get(&self, uuid: Uuid) -> Option<&SampleData> {
        self.samples.get(&uuid)
    }

    pub fn contains(&self, uuid: Uuid) -> bool {
        self.samples.contains_key(&uuid)
    }
}

/// Controller-side handle publishing pool snapshots.
#[derive(Clone, Default)]
pub struct SampleStore {
    pool: Arc<ArcSwap<SamplePool>>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uuid: Uuid, data: SampleData) {
        self.pool.rcu(|current| {
            let mut next = SamplePool::clone(current);
            next.samples.insert(uuid, data.clone());
            next
        });
    }

    pub fn remove(&self, uuid: Uuid) {
        self.pool.rcu(|current| {
            let mut next = SamplePool::clone(current);
            next.samples.remove(&uuid);
            next
        });
    }

    /// Current snapshot. Cheap enough to call once per render callback.
    pub fn load(&self) -> arc_swap::Guard<Arc<SamplePool>> {
        self.pool.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshots_are_stable() {
        let store = SampleStore::new();
        let uuid = Uuid::new_v4();
        let before = store.load();
        store.insert(uuid, SampleData::new(48000, vec![vec![0.5; 4]]));
        assert!(!before.contains(uuid));
        let after = store.load();
        assert_eq!(after.get(uuid).map(SampleData::frames), Some(4));
        // mono feeds the right channel too
        assert_eq!(after.get(uuid).map(|data| data.frame(1, 2)), Some(0.5));
        store.remove(uuid);
        assert!(!store.load().contains(uuid));
    }

    #[test]
    fn test_load_wav() {
        let path = std::env::temp_dir().join(format!("tactus-{}.wav", Uuid::new_v4()));
        let spec = hound::WavSpec { channels: 2, sample_rate: 44100, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..8 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(-16384i16).unwrap();
        }
        writer.finalize().unwrap();

        let data = SampleData::load_wav(&path).unwrap();
        assert_eq!(data.sample_rate, 44100);
        assert_eq!(data.frames(), 8);
        assert_eq!(data.frame(0, 0), 0.5);
        assert_eq!(data.frame(1, 7), -0.5);
        std::fs::remove_file(path).ok();
    }
}
