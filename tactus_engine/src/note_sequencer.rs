//! Note generation from a unit's tracks, launched clips and live input.

use crate::block::BlockFlags;
use crate::events::{NoteEvent, NoteLifecycleEvent};
use crate::processor::ProcessContext;
use crate::retainer::EventSpanRetainer;
use crate::telemetry::TelemetryRecord;
use tactus_shared::ppqn::{quantize_floor, Ppqn};
use tactus_shared::project::{curve_func, inverse_curve_func, NoteClip, NoteCollection, TrackModel};
use uuid::Uuid;

/// Something that produces note lifecycle events for a range.
pub trait NoteEventSource {
    /// Appends the lifecycle events of `[from, to)` to `out`.
    fn process_notes(
        &mut self,
        ctx: &mut ProcessContext,
        from: Ppqn,
        to: Ppqn,
        flags: BlockFlags,
        out: &mut Vec<NoteLifecycleEvent>,
    );

    /// Appends the notes held at `position`. With `only_external` set,
    /// only live input is reported.
    fn active_notes_at(&self, position: Ppqn, only_external: bool, out: &mut Vec<NoteEvent>);
}

#[derive(Debug, Clone)]
struct ExternalNote {
    pitch: u8,
    velocity: f32,
    gate: bool,
    running: Option<NoteEvent>,
}

pub struct NoteSequencer {
    unit: Uuid,
    random: fastrand::Rng,
    external: Vec<ExternalNote>,
    retainer: EventSpanRetainer<NoteEvent>,
}

impl NoteSequencer {
    pub fn new(unit: Uuid) -> Self {
        Self {
            unit,
            random: fastrand::Rng::with_seed(0xFFFF123),
            external: Vec::new(),
            retainer: EventSpanRetainer::new(),
        }
    }

    pub fn unit(&self) -> Uuid {
        self.unit
    }

    pub fn push_note_on(&mut self, pitch: u8, velocity: f32) {
        self.external.push(ExternalNote { pitch, velocity, gate: true, running: None });
    }

    /// Closes the gate of a held note. A note that never started is dropped.
    pub fn push_note_off(&mut self, pitch: u8) {
        if let Some(index) = self.external.iter().position(|note| note.pitch == pitch && note.gate) {
            if self.external[index].running.is_none() {
                self.external.remove(index);
            } else {
                self.external[index].gate = false;
            }
        }
    }

    /// Forgets released live notes. Runs once the callback completed.
    pub fn on_after_process(&mut self) {
        self.external.retain(|note| note.gate);
    }

    pub fn reset(&mut self) {
        self.retainer.clear();
        self.external.clear();
    }

    pub fn retained(&self) -> usize {
        self.retainer.len()
    }

    /// Stops every retained note at `from`.
    pub fn release_all(&mut self, ctx: &mut ProcessContext, from: Ppqn, out: &mut Vec<NoteLifecycleEvent>) {
        for note in self.retainer.release_all() {
            ctx.telemetry.push(TelemetryRecord::NoteOff { unit: self.unit, pitch: note.pitch });
            out.push(NoteLifecycleEvent::stop(&note, from));
        }
    }

    fn release_completed(&mut self, ctx: &mut ProcessContext, from: Ppqn, to: Ppqn, out: &mut Vec<NoteLifecycleEvent>) {
        for note in self.retainer.release_linear_completed(to) {
            ctx.telemetry.push(TelemetryRecord::NoteOff { unit: self.unit, pitch: note.pitch });
            // the tempo or position may have moved since the note started
            out.push(NoteLifecycleEvent::stop(&note, note.complete().clamp(from, to)));
        }
    }

    fn process_external(&mut self, ctx: &mut ProcessContext, from: Ppqn, out: &mut Vec<NoteLifecycleEvent>) {
        let note_ids = &mut *ctx.note_ids;
        self.external.retain_mut(|note| {
            let (pitch, velocity) = (note.pitch, note.velocity);
            let running = *note.running.get_or_insert_with(|| {
                let event =
                    NoteEvent { id: note_ids.next(), position: from, duration: Ppqn::INFINITY, pitch, velocity, cent: 0.0 };
                out.push(NoteLifecycleEvent::Start(event));
                event
            });
            if !note.gate {
                out.push(NoteLifecycleEvent::stop(&running, from));
            }
            note.gate
        });
    }

    fn process_track(
        &mut self,
        ctx: &mut ProcessContext,
        track: &TrackModel,
        from: Ppqn,
        to: Ppqn,
        out: &mut Vec<NoteLifecycleEvent>,
    ) {
        for section in ctx.clips.iterate(track.uuid, from, to) {
            match section.clip {
                Some(scheduled) => {
                    // a clip deleted mid-playback reads as silence
                    if let Some(clip) = track.clips.iter().find(|clip| clip.uuid == scheduled.uuid) {
                        self.process_clip(ctx, clip, section.from, section.to, out);
                    }
                }
                None => self.process_regions(ctx, track, section.from, section.to, out),
            }
        }
    }

    fn process_clip(&mut self, ctx: &mut ProcessContext, clip: &NoteClip, p0: Ppqn, p1: Ppqn, out: &mut Vec<NoteLifecycleEvent>) {
        if clip.mute || clip.duration <= 0.0 {
            return;
        }
        let clip_start = quantize_floor(p0, clip.duration);
        let clip_end = clip_start + clip.duration;
        if p1 > clip_end {
            self.process_collection(ctx, &clip.events, p0, clip_end, clip_start, out);
            self.process_collection(ctx, &clip.events, clip_end, p1, clip_end, out);
        } else {
            self.process_collection(ctx, &clip.events, p0, p1, clip_start, out);
        }
    }

    fn process_regions(&mut self, ctx: &mut ProcessContext, track: &TrackModel, p0: Ppqn, p1: Ppqn, out: &mut Vec<NoteLifecycleEvent>) {
        for region in track.regions_in(p0, p1) {
            if region.mute {
                continue;
            }
            for cycle in region.loop_cycles(p0, p1) {
                self.process_collection(ctx, &region.events, cycle.result_start, cycle.result_end, cycle.raw_start, out);
            }
        }
    }

    /// Starts the notes of `collection` within `[start, end)`, where local
    /// position zero lies at `delta`.
    fn process_collection(
        &mut self,
        ctx: &mut ProcessContext,
        collection: &NoteCollection,
        start: Ppqn,
        end: Ppqn,
        delta: Ppqn,
        out: &mut Vec<NoteLifecycleEvent>,
    ) {
        let local_start = start - delta;
        let local_end = end - delta;
        for source in collection.range(local_start - collection.max_duration(), local_end) {
            if source.chance < 100.0 && self.random.f64() * 100.0 > source.chance as f64 {
                continue;
            }
            if source.play_count > 1 {
                let curve = source.play_curve as f64;
                let count = source.play_count as f64;
                let search_start = inverse_curve_func((local_start - source.position) / source.duration, curve);
                let search_limit = inverse_curve_func((local_end - source.position) / source.duration, curve);
                let mut search_index = (search_start * count).floor();
                let mut search_position = search_index / count;
                while search_position < search_limit {
                    if search_position >= search_start {
                        let a = curve_func(search_position, curve) * source.duration;
                        if a >= source.duration {
                            break;
                        }
                        let b = curve_func(search_position + 1.0 / count, curve) * source.duration;
                        self.start_note(ctx, source.position + a + delta, b - a, source.pitch, source.velocity, source.cent, out);
                    }
                    search_index += 1.0;
                    search_position = search_index / count;
                }
            } else if local_start <= source.position && source.position < local_end {
                self.start_note(ctx, source.position + delta, source.duration, source.pitch, source.velocity, source.cent, out);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn start_note(
        &mut self,
        ctx: &mut ProcessContext,
        position: Ppqn,
        duration: Ppqn,
        pitch: u8,
        velocity: f32,
        cent: f32,
        out: &mut Vec<NoteLifecycleEvent>,
    ) {
        let event = NoteEvent { id: ctx.note_ids.next(), position, duration, pitch, velocity, cent };
        self.retainer.add_and_retain(event);
        ctx.telemetry.push(TelemetryRecord::NoteOn { unit: self.unit, pitch });
        out.push(NoteLifecycleEvent::Start(event));
    }
}

impl NoteEventSource for NoteSequencer {
    fn process_notes(
        &mut self,
        ctx: &mut ProcessContext,
        from: Ppqn,
        to: Ppqn,
        flags: BlockFlags,
        out: &mut Vec<NoteLifecycleEvent>,
    ) {
        let read = flags.contains(BlockFlags::TRANSPORTING | BlockFlags::PLAYING);
        if !self.retainer.is_empty() {
            if !read || flags.discontinuous() {
                self.release_all(ctx, from, out);
            } else {
                self.release_completed(ctx, from, to, out);
            }
        }
        if !self.external.is_empty() {
            self.process_external(ctx, from, out);
        }
        if !read {
            return;
        }
        let project = ctx.project;
        let Some(unit) = project.audio_unit(self.unit) else {
            return;
        };
        for track in unit.tracks.iter().filter(|track| track.enabled) {
            self.process_track(ctx, track, from, to, out);
        }
        // notes may complete within the block they started in
        self.release_completed(ctx, from, to, out);
    }

    fn active_notes_at(&self, position: Ppqn, only_external: bool, out: &mut Vec<NoteEvent>) {
        for note in &self.external {
            out.push(NoteEvent {
                id: note.running.map_or(0, |running| running.id),
                position,
                duration: Ppqn::INFINITY,
                pitch: note.pitch,
                velocity: note.velocity,
                cent: 0.0,
            });
        }
        if !only_external {
            out.extend(self.retainer.overlapping(position).copied());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip_sequencer::ScheduledClip;
    use crate::processor::harness::Harness;
    use crate::telemetry::TelemetryRecord;
    use tactus_shared::ppqn::{BAR, QUARTER};
    use tactus_shared::project::{AudioUnitKind, AudioUnitModel, NoteEventModel, NoteRegion};

    fn playing() -> BlockFlags {
        BlockFlags::create(true, false, true, false)
    }

    fn setup(track: TrackModel) -> (Harness, Uuid) {
        let mut harness = Harness::new();
        let mut unit = AudioUnitModel::new("Notes", AudioUnitKind::Bus, None);
        unit.tracks.push(track);
        let uuid = unit.uuid;
        harness.project.audio_units.push(unit);
        (harness, uuid)
    }

    fn starts(events: &[NoteLifecycleEvent]) -> Vec<(Ppqn, u8)> {
        events
            .iter()
            .filter_map(|event| match event {
                NoteLifecycleEvent::Start(note) => Some((note.position, note.pitch)),
                _ => None,
            })
            .collect()
    }

    fn stops(events: &[NoteLifecycleEvent]) -> Vec<Ppqn> {
        events
            .iter()
            .filter_map(|event| match event {
                NoteLifecycleEvent::Stop { position, .. } => Some(*position),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_region_notes_start_and_stop() {
        let mut track = TrackModel::new();
        track.regions.push(NoteRegion::new(
            BAR,
            BAR,
            NoteCollection::new(vec![NoteEventModel::new(0.0, 100.0, 60, 0.8), NoteEventModel::new(QUARTER, 100.0, 64, 0.8)]),
        ));
        let (mut harness, unit) = setup(track);
        let mut sequencer = NoteSequencer::new(unit);
        let mut out = Vec::new();

        sequencer.process_notes(&mut harness.context(), BAR - 10.0, BAR + 50.0, playing(), &mut out);
        assert_eq!(starts(&out), vec![(BAR, 60)]);
        assert!(stops(&out).is_empty());
        assert_eq!(sequencer.retained(), 1);

        out.clear();
        sequencer.process_notes(&mut harness.context(), BAR + 50.0, BAR + QUARTER + 10.0, playing(), &mut out);
        assert_eq!(starts(&out), vec![(BAR + QUARTER, 64)]);
        assert_eq!(stops(&out), vec![BAR + 100.0]);

        let records: Vec<_> = harness.telemetry_receiver.drain().collect();
        assert_eq!(records[0], TelemetryRecord::NoteOn { unit, pitch: 60 });
        assert!(records.contains(&TelemetryRecord::NoteOff { unit, pitch: 60 }));
    }

    #[test]
    fn test_looped_region_repeats_notes() {
        let mut track = TrackModel::new();
        let mut region = NoteRegion::new(0.0, BAR, NoteCollection::new(vec![NoteEventModel::new(0.0, 10.0, 60, 1.0)]));
        region.loop_duration = QUARTER;
        track.regions.push(region);
        let (mut harness, unit) = setup(track);
        let mut sequencer = NoteSequencer::new(unit);
        let mut out = Vec::new();
        sequencer.process_notes(&mut harness.context(), 0.0, BAR, playing(), &mut out);
        let positions: Vec<_> = starts(&out).into_iter().map(|(position, _)| position).collect();
        assert_eq!(positions, vec![0.0, QUARTER, QUARTER * 2.0, QUARTER * 3.0]);
        // all of them complete within the range
        assert_eq!(stops(&out).len(), 4);
    }

    #[test]
    fn test_discontinuity_releases_everything() {
        let mut track = TrackModel::new();
        track.regions.push(NoteRegion::new(0.0, BAR, NoteCollection::new(vec![NoteEventModel::new(0.0, BAR, 60, 1.0)])));
        let (mut harness, unit) = setup(track);
        let mut sequencer = NoteSequencer::new(unit);
        let mut out = Vec::new();
        sequencer.process_notes(&mut harness.context(), 0.0, 8.0, playing(), &mut out);
        assert_eq!(sequencer.retained(), 1);

        out.clear();
        let jump = BlockFlags::create(true, true, true, false);
        sequencer.process_notes(&mut harness.context(), 2000.0, 2008.0, jump, &mut out);
        assert_eq!(stops(&out), vec![2000.0]);
        assert!(starts(&out).is_empty());

        out.clear();
        sequencer.process_notes(&mut harness.context(), 0.0, 8.0, playing(), &mut out);
        sequencer.process_notes(&mut harness.context(), 8.0, 16.0, BlockFlags::NONE, &mut out);
        assert_eq!(stops(&out), vec![8.0]);
        assert_eq!(sequencer.retained(), 0);
    }

    #[test]
    fn test_launched_clip_replaces_regions() {
        let mut track = TrackModel::new();
        track.regions.push(NoteRegion::new(0.0, BAR * 4.0, NoteCollection::new(vec![NoteEventModel::new(BAR, 10.0, 48, 1.0)])));
        let clip = NoteClip::new(QUARTER, true, NoteCollection::new(vec![NoteEventModel::new(0.0, 10.0, 72, 1.0)]));
        let scheduled = ScheduledClip::from(&clip);
        track.clips.push(clip);
        let track_id = track.uuid;
        let (mut harness, unit) = setup(track);
        harness.clips.schedule_play(track_id, scheduled);
        let mut sequencer = NoteSequencer::new(unit);
        let mut out = Vec::new();
        // the clip starts at the next bar and wraps every quarter
        sequencer.process_notes(&mut harness.context(), BAR - 100.0, BAR + QUARTER * 2.0, playing(), &mut out);
        assert_eq!(starts(&out), vec![(BAR, 72), (BAR + QUARTER, 72)]);
        assert_eq!(harness.clips.playing(track_id), Some(scheduled.uuid));
    }

    #[test]
    fn test_external_notes() {
        let (mut harness, unit) = setup(TrackModel::new());
        let mut sequencer = NoteSequencer::new(unit);
        let mut out = Vec::new();

        sequencer.push_note_on(60, 1.0);
        sequencer.push_note_on(62, 1.0);
        sequencer.push_note_off(62);
        sequencer.process_notes(&mut harness.context(), 0.0, 8.0, BlockFlags::NONE, &mut out);
        assert_eq!(starts(&out), vec![(0.0, 60)]);

        let mut held = Vec::new();
        sequencer.active_notes_at(4.0, true, &mut held);
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].position, 4.0);
        assert!(held[0].duration.is_infinite());

        out.clear();
        sequencer.push_note_off(60);
        sequencer.process_notes(&mut harness.context(), 8.0, 16.0, BlockFlags::NONE, &mut out);
        assert_eq!(stops(&out), vec![8.0]);
        sequencer.on_after_process();
        held.clear();
        sequencer.active_notes_at(20.0, false, &mut held);
        assert!(held.is_empty());
    }

    #[test]
    fn test_play_count_subdivides() {
        let mut note = NoteEventModel::new(0.0, QUARTER, 60, 1.0);
        note.play_count = 4;
        let mut track = TrackModel::new();
        track.regions.push(NoteRegion::new(0.0, BAR, NoteCollection::new(vec![note])));
        let (mut harness, unit) = setup(track);
        let mut sequencer = NoteSequencer::new(unit);
        let mut out = Vec::new();
        sequencer.process_notes(&mut harness.context(), 0.0, QUARTER, playing(), &mut out);
        let positions: Vec<_> = starts(&out).into_iter().map(|(position, _)| position).collect();
        assert_eq!(positions, vec![0.0, 240.0, 480.0, 720.0]);
    }

    #[test]
    fn test_zero_chance_never_plays() {
        let mut note = NoteEventModel::new(0.0, 10.0, 60, 1.0);
        note.chance = 0.0;
        let mut track = TrackModel::new();
        track.regions.push(NoteRegion::new(0.0, BAR, NoteCollection::new(vec![note])));
        let (mut harness, unit) = setup(track);
        let mut sequencer = NoteSequencer::new(unit);
        let mut out = Vec::new();
        sequencer.process_notes(&mut harness.context(), 0.0, BAR, playing(), &mut out);
        assert!(out.is_empty());
    }
}
