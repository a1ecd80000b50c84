//! Musical time in pulses.
//!
//! A pulse is a tempo independent unit of musical time. Conversions to and
//! from samples always take the tempo and sample rate that are valid for the
//! range being converted.

/// Musical position or duration in pulses.
pub type Ppqn = f64;

/// Pulses per quarter note.
pub const QUARTER: Ppqn = 960.0;
/// Pulses per 4/4 bar.
pub const BAR: Ppqn = QUARTER * 4.0;
/// Pulses per semi-quaver.
pub const SEMI_QUAVER: Ppqn = QUARTER / 4.0;

/// Length of `nominator` notes of value `1/denominator`.
pub fn from_signature(nominator: u32, denominator: u32) -> Ppqn {
    (BAR / denominator as f64).floor() * nominator as f64
}

pub fn samples_to_pulses(samples: f64, bpm: f64, sample_rate: f64) -> Ppqn {
    samples * bpm * QUARTER / (60.0 * sample_rate)
}

pub fn pulses_to_samples(pulses: Ppqn, bpm: f64, sample_rate: f64) -> f64 {
    pulses * 60.0 * sample_rate / (QUARTER * bpm)
}

pub fn seconds_to_pulses(seconds: f64, bpm: f64) -> Ppqn {
    seconds * bpm / 60.0 * QUARTER
}

pub fn pulses_to_seconds(pulses: Ppqn, bpm: f64) -> f64 {
    pulses / QUARTER * 60.0 / bpm
}

#[inline]
pub fn quantize_floor(value: f64, interval: f64) -> f64 {
    (value / interval).floor() * interval
}

#[inline]
pub fn quantize_ceil(value: f64, interval: f64) -> f64 {
    (value / interval).ceil() * interval
}

/// Bars, beats and semi-quavers of a position (4/4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parts {
    pub bars: i64,
    pub beats: i64,
    pub semiquavers: i64,
}

pub fn to_parts(position: Ppqn) -> Parts {
    let bars = (position / BAR).floor();
    let rest = position - bars * BAR;
    let beats = (rest / QUARTER).floor();
    let rest = rest - beats * QUARTER;
    Parts {
        bars: bars as i64,
        beats: beats as i64,
        semiquavers: (rest / SEMI_QUAVER).floor() as i64,
    }
}

/// A position produced by [`fragments`], with the running step index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment {
    pub position: Ppqn,
    pub index: i64,
}

/// Every multiple of `step` within `[from, to)`.
///
/// The iterator is lazy and single-pass. `index` counts steps from zero on
/// the timeline, so it keeps increasing across consecutive ranges.
pub fn fragments(from: Ppqn, to: Ppqn, step: Ppqn) -> Fragments {
    let index = (from / step).ceil() as i64;
    Fragments { index, to, step }
}

#[derive(Debug, Clone)]
pub struct Fragments {
    index: i64,
    to: Ppqn,
    step: Ppqn,
}

impl Iterator for Fragments {
    type Item = Fragment;

    fn next(&mut self) -> Option<Fragment> {
        if !(self.step > 0.0) {
            return None;
        }
        let position = self.index as f64 * self.step;
        if position >= self.to {
            return None;
        }
        let fragment = Fragment { position, index: self.index };
        self.index += 1;
        Some(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_conversion() {
        // One quarter at 120bpm is half a second
        assert_eq!(pulses_to_samples(QUARTER, 120.0, 48000.0), 24000.0);
        assert_eq!(samples_to_pulses(24000.0, 120.0, 48000.0), QUARTER);
        let p = samples_to_pulses(128.0, 133.0, 44100.0);
        assert!((pulses_to_samples(p, 133.0, 44100.0) - 128.0).abs() < 1e-9);
    }

    #[test]
    fn test_signature() {
        assert_eq!(from_signature(4, 4), BAR);
        assert_eq!(from_signature(3, 4), 3.0 * QUARTER);
        assert_eq!(from_signature(6, 8), 6.0 * 480.0);
    }

    #[test]
    fn test_quantize() {
        assert_eq!(quantize_floor(1900.0, QUARTER), 960.0);
        assert_eq!(quantize_ceil(1900.0, QUARTER), 1920.0);
        assert_eq!(quantize_floor(-10.0, QUARTER), -960.0);
    }

    #[test]
    fn test_fragments() {
        let positions: Vec<_> = fragments(0.0, 2000.0, QUARTER).map(|f| f.position).collect();
        assert_eq!(positions, vec![0.0, 960.0, 1920.0]);

        let indices: Vec<_> = fragments(961.0, 3000.0, QUARTER).map(|f| f.index).collect();
        assert_eq!(indices, vec![2, 3]);

        assert_eq!(fragments(10.0, 20.0, QUARTER).count(), 0);
        assert_eq!(fragments(0.0, 20.0, 0.0).count(), 0);
    }

    #[test]
    fn test_parts() {
        assert_eq!(to_parts(BAR + QUARTER * 2.0 + SEMI_QUAVER), Parts { bars: 1, beats: 2, semiquavers: 1 });
        assert_eq!(to_parts(0.0).beats, 0);
    }

    proptest::proptest! {
        #[test]
        fn prop_fragments_cover_range(from in -10_000.0f64..10_000.0, length in 0.0f64..20_000.0, step in 1.0f64..4000.0) {
            let to = from + length;
            let mut previous: Option<Fragment> = None;
            for fragment in fragments(from, to, step) {
                proptest::prop_assert!(fragment.position >= from - 1e-9 && fragment.position < to);
                if let Some(previous) = previous {
                    proptest::prop_assert_eq!(fragment.index, previous.index + 1);
                }
                previous = Some(fragment);
            }
            let next = previous.map_or((from / step).ceil(), |last| (last.index + 1) as f64) * step;
            proptest::prop_assert!(next >= to);
        }
    }
}
