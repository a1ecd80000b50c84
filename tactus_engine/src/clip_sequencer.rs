//! Quantized clip launching per track.

use log::debug;
use std::collections::HashMap;
use tactus_shared::ppqn::{quantize_floor, Ppqn, BAR};
use tactus_shared::project::NoteClip;
use uuid::Uuid;

/// The parts of a clip the scheduler needs, copied out of the project.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledClip {
    pub uuid: Uuid,
    pub duration: Ppqn,
    pub looping: bool,
}

impl From<&NoteClip> for ScheduledClip {
    fn from(clip: &NoteClip) -> Self {
        Self { uuid: clip.uuid, duration: clip.duration, looping: clip.looping }
    }
}

/// A range of a track either playing a clip or falling back to its regions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Section {
    pub clip: Option<ScheduledClip>,
    pub from: Ppqn,
    pub to: Ppqn,
}

#[derive(Debug, Default)]
struct TrackState {
    playing: Option<ScheduledClip>,
    /// `Some(None)` is a pending stop, `Some(Some(clip))` a pending start.
    waiting: Option<Option<ScheduledClip>>,
}

/// Clip identities that started, stopped or were superseded since the last drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipSequenceChanges {
    pub started: Vec<Uuid>,
    pub stopped: Vec<Uuid>,
    pub obsolete: Vec<Uuid>,
}

/// At most two sections, the state before and after a transition.
#[derive(Debug, Clone)]
pub struct Sections {
    items: [Option<Section>; 2],
    at: usize,
}

impl Sections {
    fn one(section: Section) -> Self {
        Self { items: [Some(section), None], at: 0 }
    }

    fn two(first: Option<Section>, second: Option<Section>) -> Self {
        Self { items: [first, second], at: 0 }
    }
}

impl Iterator for Sections {
    type Item = Section;

    fn next(&mut self) -> Option<Section> {
        while self.at < self.items.len() {
            let item = self.items[self.at].take();
            self.at += 1;
            if item.is_some() {
                return item;
            }
        }
        None
    }
}

#[derive(Debug, Default)]
pub struct ClipSequencer {
    states: HashMap<Uuid, TrackState>,
    changes: ClipSequenceChanges,
}

impl ClipSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_play(&mut self, track: Uuid, clip: ScheduledClip) {
        let state = self.states.entry(track).or_default();
        if state.playing.map(|playing| playing.uuid) == Some(clip.uuid) {
            debug!("clip {} is already playing", clip.uuid);
            return;
        }
        if let Some(Some(waiting)) = state.waiting.take() {
            self.changes.obsolete.push(waiting.uuid);
        }
        self.changes.obsolete.retain(|uuid| *uuid != clip.uuid);
        debug!("schedule play {} on track {}", clip.uuid, track);
        state.waiting = Some(Some(clip));
    }

    pub fn schedule_stop(&mut self, track: Uuid) {
        let state = self.states.entry(track).or_default();
        if let Some(Some(waiting)) = state.waiting.take() {
            self.changes.obsolete.push(waiting.uuid);
        }
        if state.playing.is_some() {
            debug!("schedule stop on track {}", track);
            state.waiting = Some(None);
        }
    }

    /// Sections of `[from, to)` for `track`, applying a due transition.
    pub fn iterate(&mut self, track: Uuid, from: Ppqn, to: Ppqn) -> Sections {
        let Some(state) = self.states.get_mut(&track) else {
            return Sections::one(Section { clip: None, from, to });
        };
        if let Some(next) = state.waiting {
            let duration = state.playing.map_or(BAR, |clip| clip.duration);
            let boundary = quantize_floor(to, duration);
            if boundary < from {
                return Sections::one(Section { clip: state.playing, from, to });
            }
            let before = (from < boundary).then_some(Section { clip: state.playing, from, to: boundary });
            state.waiting = None;
            if let Some(playing) = state.playing {
                self.changes.stopped.push(playing.uuid);
            }
            state.playing = next;
            if let Some(next) = next {
                self.changes.started.push(next.uuid);
            }
            let after = (boundary < to).then_some(Section { clip: state.playing, from: boundary, to });
            return Sections::two(before, after);
        }
        match state.playing {
            Some(playing) if !playing.looping => {
                let end = quantize_floor(from, playing.duration) + playing.duration;
                if end <= to {
                    state.playing = None;
                    self.changes.stopped.push(playing.uuid);
                    let after = (end < to).then_some(Section { clip: None, from: end, to });
                    Sections::two(Some(Section { clip: Some(playing), from, to: end }), after)
                } else {
                    Sections::one(Section { clip: Some(playing), from, to })
                }
            }
            playing => Sections::one(Section { clip: playing, from, to }),
        }
    }

    pub fn playing(&self, track: Uuid) -> Option<Uuid> {
        self.states.get(&track).and_then(|state| state.playing).map(|clip| clip.uuid)
    }

    /// Drains the pending change lists. `None` if nothing changed.
    pub fn changes(&mut self) -> Option<ClipSequenceChanges> {
        let changes = &self.changes;
        if changes.started.is_empty() && changes.stopped.is_empty() && changes.obsolete.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.changes))
    }

    pub fn on_track_deleted(&mut self, track: Uuid) {
        if let Some(state) = self.states.remove(&track) {
            if let Some(playing) = state.playing {
                self.changes.stopped.push(playing.uuid);
            }
        }
    }

    pub fn on_clip_deleted(&mut self, clip: Uuid) {
        for state in self.states.values_mut() {
            if state.playing.is_some_and(|playing| playing.uuid == clip) {
                state.playing = None;
                self.changes.stopped.push(clip);
            }
            if matches!(state.waiting, Some(Some(waiting)) if waiting.uuid == clip) {
                state.waiting = None;
            }
        }
    }

    /// Stops everything. Pending starts become obsolete.
    pub fn reset(&mut self) {
        for (_, state) in self.states.drain() {
            if let Some(Some(waiting)) = state.waiting {
                self.changes.obsolete.push(waiting.uuid);
            }
            if let Some(playing) = state.playing {
                self.changes.stopped.push(playing.uuid);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(duration: Ppqn, looping: bool) -> ScheduledClip {
        ScheduledClip { uuid: Uuid::new_v4(), duration, looping }
    }

    #[test]
    fn test_launch_on_bar_boundary() {
        let mut sequencer = ClipSequencer::new();
        let track = Uuid::new_v4();
        let x = clip(BAR * 2.0, true);
        sequencer.schedule_play(track, x);

        let sections: Vec<_> = sequencer.iterate(track, BAR * 0.5, BAR * 1.5).collect();
        assert_eq!(
            sections,
            vec![
                Section { clip: None, from: BAR * 0.5, to: BAR },
                Section { clip: Some(x), from: BAR, to: BAR * 1.5 },
            ]
        );
        let changes = sequencer.changes().unwrap();
        assert_eq!(changes.started, vec![x.uuid]);
        assert!(changes.stopped.is_empty());
        assert!(sequencer.changes().is_none());
    }

    #[test]
    fn test_unknown_track_falls_back_to_regions() {
        let mut sequencer = ClipSequencer::new();
        let sections: Vec<_> = sequencer.iterate(Uuid::new_v4(), 0.0, 100.0).collect();
        assert_eq!(sections, vec![Section { clip: None, from: 0.0, to: 100.0 }]);
    }

    #[test]
    fn test_transition_waits_for_playing_clip_length() {
        let mut sequencer = ClipSequencer::new();
        let track = Uuid::new_v4();
        let a = clip(BAR * 2.0, true);
        let b = clip(BAR, true);
        sequencer.schedule_play(track, a);
        sequencer.iterate(track, 0.0, 10.0).count();
        sequencer.schedule_play(track, b);

        // the next boundary of `a` is two bars away
        let sections: Vec<_> = sequencer.iterate(track, BAR, BAR + 10.0).collect();
        assert_eq!(sections, vec![Section { clip: Some(a), from: BAR, to: BAR + 10.0 }]);
        let sections: Vec<_> = sequencer.iterate(track, BAR * 2.0 - 5.0, BAR * 2.0 + 5.0).collect();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].clip, Some(b));
        assert_eq!(sequencer.playing(track), Some(b.uuid));
        let changes = sequencer.changes().unwrap();
        assert_eq!(changes.started, vec![a.uuid, b.uuid]);
        assert_eq!(changes.stopped, vec![a.uuid]);
    }

    #[test]
    fn test_replaced_request_is_obsolete() {
        let mut sequencer = ClipSequencer::new();
        let track = Uuid::new_v4();
        let a = clip(BAR, true);
        let b = clip(BAR, true);
        sequencer.schedule_play(track, a);
        sequencer.schedule_play(track, b);
        assert_eq!(sequencer.changes().unwrap().obsolete, vec![a.uuid]);

        // nothing plays, so a stop only cancels the pending start
        sequencer.schedule_stop(track);
        assert_eq!(sequencer.changes().unwrap().obsolete, vec![b.uuid]);
        let sections: Vec<_> = sequencer.iterate(track, 0.0, BAR * 2.0).collect();
        assert_eq!(sections, vec![Section { clip: None, from: 0.0, to: BAR * 2.0 }]);
    }

    #[test]
    fn test_schedule_stop() {
        let mut sequencer = ClipSequencer::new();
        let track = Uuid::new_v4();
        let a = clip(BAR, true);
        sequencer.schedule_play(track, a);
        sequencer.iterate(track, 0.0, 1.0).count();
        sequencer.schedule_stop(track);
        let sections: Vec<_> = sequencer.iterate(track, BAR - 1.0, BAR + 1.0).collect();
        assert_eq!(
            sections,
            vec![
                Section { clip: Some(a), from: BAR - 1.0, to: BAR },
                Section { clip: None, from: BAR, to: BAR + 1.0 },
            ]
        );
        assert_eq!(sequencer.playing(track), None);
    }

    #[test]
    fn test_one_shot_clip_stops_itself() {
        let mut sequencer = ClipSequencer::new();
        let track = Uuid::new_v4();
        let a = clip(BAR, false);
        sequencer.schedule_play(track, a);
        sequencer.iterate(track, 0.0, 10.0).count();
        sequencer.changes();

        let sections: Vec<_> = sequencer.iterate(track, BAR - 10.0, BAR + 10.0).collect();
        assert_eq!(
            sections,
            vec![
                Section { clip: Some(a), from: BAR - 10.0, to: BAR },
                Section { clip: None, from: BAR, to: BAR + 10.0 },
            ]
        );
        assert_eq!(sequencer.changes().unwrap().stopped, vec![a.uuid]);
    }

    #[test]
    fn test_deletion_clears_state() {
        let mut sequencer = ClipSequencer::new();
        let (track, other) = (Uuid::new_v4(), Uuid::new_v4());
        let a = clip(BAR, true);
        let b = clip(BAR, true);
        sequencer.schedule_play(track, a);
        sequencer.iterate(track, 0.0, 1.0).count();
        sequencer.schedule_play(other, b);
        sequencer.changes();

        sequencer.on_clip_deleted(b.uuid);
        sequencer.on_track_deleted(track);
        assert_eq!(sequencer.playing(track), None);
        assert_eq!(sequencer.changes().unwrap().stopped, vec![a.uuid]);
        let sections: Vec<_> = sequencer.iterate(other, 0.0, BAR * 2.0).collect();
        assert_eq!(sections, vec![Section { clip: None, from: 0.0, to: BAR * 2.0 }]);
    }

    #[test]
    fn test_reset() {
        let mut sequencer = ClipSequencer::new();
        let track = Uuid::new_v4();
        let (a, b) = (clip(BAR, true), clip(BAR, true));
        sequencer.schedule_play(track, a);
        sequencer.iterate(track, 0.0, 1.0).count();
        sequencer.schedule_play(track, b);
        sequencer.changes();
        sequencer.reset();
        let changes = sequencer.changes().unwrap();
        assert_eq!(changes.stopped, vec![a.uuid]);
        assert_eq!(changes.obsolete, vec![b.uuid]);
        assert_eq!(sequencer.playing(track), None);
    }
}
