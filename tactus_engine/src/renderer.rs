//! Splits one render quantum into sub-blocks at loop ends, marker
//! boundaries and scheduled callbacks.

use crate::block::{Block, BlockFlags, ProcessInfo};
use crate::time_info::TimeInfo;
use tactus_shared::ppqn::{self, Ppqn};
use tactus_shared::project::Timeline;
use tactus_shared::RENDER_QUANTUM;
use uuid::Uuid;

/// One-shot action run on the audio thread when playback reaches its position.
pub type Callback = Box<dyn FnOnce(&mut TimeInfo) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// The marker section currently playing and how often it has repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerState {
    pub marker: Uuid,
    pub repeat: u32,
}

enum Action {
    Loop { target: Ppqn },
    /// `prev` is the marker whose section is being left, `next` the one
    /// being entered (absent when entering the very first marker).
    Marker { prev: usize, next: Option<usize> },
    Callback { position: Ppqn },
}

struct Scheduled {
    id: CallbackId,
    position: Ppqn,
    callback: Callback,
}

pub struct BlockRenderer {
    sample_rate: f64,
    callbacks: Vec<Scheduled>,
    next_callback: u64,
    tempo_changed: bool,
    markers_changed: bool,
    current_marker: Option<MarkerState>,
    /// A jump that landed exactly on the end of the previous quantum.
    pending_discontinuity: bool,
    /// Follows the transport while it runs, keeps counting while stopped.
    free_running_position: Ppqn,
}

impl BlockRenderer {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            callbacks: Vec::with_capacity(8),
            next_callback: 0,
            tempo_changed: false,
            markers_changed: false,
            current_marker: None,
            pending_discontinuity: false,
            free_running_position: 0.0,
        }
    }

    /// Schedules `callback` to run once when playback crosses `position`.
    pub fn set_callback(&mut self, position: Ppqn, callback: Callback) -> CallbackId {
        self.next_callback += 1;
        let id = CallbackId(self.next_callback);
        self.callbacks.push(Scheduled { id, position, callback });
        id
    }

    /// Returns false if the callback already ran or was cancelled.
    pub fn cancel_callback(&mut self, id: CallbackId) -> bool {
        let count = self.callbacks.len();
        self.callbacks.retain(|scheduled| scheduled.id != id);
        count != self.callbacks.len()
    }

    pub fn on_tempo_changed(&mut self) {
        self.tempo_changed = true;
    }

    pub fn on_markers_changed(&mut self) {
        self.markers_changed = true;
    }

    pub fn marker_state(&self) -> Option<MarkerState> {
        self.current_marker
    }

    pub fn reset(&mut self) {
        self.tempo_changed = false;
        self.markers_changed = false;
        self.pending_discontinuity = false;
        self.free_running_position = 0.0;
        self.current_marker = None;
    }

    /// Fills `info` with the sub-blocks of the next quantum and advances the
    /// transport past them. Returns true if the marker state changed.
    pub fn process(&mut self, time_info: &mut TimeInfo, timeline: &Timeline, info: &mut ProcessInfo) -> bool {
        info.blocks.clear();
        let bpm = timeline.bpm;
        if time_info.transporting {
            self.process_transporting(time_info, timeline, bpm, info)
        } else {
            self.process_stopped(time_info, timeline, bpm, info)
        }
    }

    fn process_transporting(
        &mut self,
        time_info: &mut TimeInfo,
        timeline: &Timeline,
        bpm: f64,
        info: &mut ProcessInfo,
    ) -> bool {
        let markers = &timeline.markers;
        let mut marker_changed = false;
        let mut p0 = time_info.position();
        let mut s0 = 0usize;
        let mut index = 0usize;
        let mut discontinuous = time_info.take_leap() | std::mem::take(&mut self.pending_discontinuity);

        while s0 < RENDER_QUANTUM {
            if self.markers_changed || discontinuous {
                self.markers_changed = false;
                let marker = markers.lower_equal(p0).map(|marker| marker.uuid);
                if self.current_marker.map(|state| state.marker) != marker {
                    self.current_marker = marker.map(|marker| MarkerState { marker, repeat: 0 });
                    marker_changed = true;
                }
            }
            let samples = RENDER_QUANTUM - s0;
            let p1 = p0 + ppqn::samples_to_pulses(samples as f64, bpm, self.sample_rate);
            let mut action = None;
            let mut action_position = f64::INFINITY;

            // Marker
            if markers.enabled && !markers.markers.is_empty() {
                let first = markers.floor_index(p0).unwrap_or(0);
                let prev = &markers.markers[first];
                let next = markers.markers.get(first + 1);
                match self.current_marker {
                    None => {
                        // every marker lies ahead
                        if prev.position >= p0 && prev.position < p1 {
                            action = Some(Action::Marker { prev: first, next: next.map(|_| first + 1) });
                            action_position = prev.position;
                        }
                    }
                    Some(current) => {
                        if let Some(next) = next {
                            if next.uuid != current.marker && prev.position < p0 && next.position <= p1 {
                                action = Some(Action::Marker { prev: first, next: Some(first + 1) });
                                action_position = next.position;
                            }
                        }
                    }
                }
            }
            // Loop
            let area = &timeline.loop_area;
            if area.enabled && area.from < area.to && !(time_info.is_recording || time_info.is_counting_in) {
                if p0 < area.to && area.to <= p1 && area.to < action_position {
                    action = Some(Action::Loop { target: area.from });
                    action_position = area.to;
                }
            }
            // Callbacks
            for scheduled in &self.callbacks {
                let position = scheduled.position;
                if p0 < position && position <= p1 && position < action_position {
                    action = Some(Action::Callback { position });
                    action_position = position;
                }
            }

            let flags = |discontinuous: bool, tempo_changed: bool, time_info: &TimeInfo| {
                BlockFlags::create(true, discontinuous, !time_info.is_counting_in, tempo_changed)
            };
            match action {
                None => {
                    let s1 = s0 + samples;
                    info.blocks.push(Block {
                        index,
                        p0,
                        p1,
                        s0,
                        s1,
                        bpm,
                        flags: flags(discontinuous, self.tempo_changed, time_info),
                    });
                    index += 1;
                    discontinuous = false;
                    p0 = p1;
                    s0 = s1;
                }
                Some(action) => {
                    let mut advance_to_action = |p0: &mut Ppqn, s0: &mut usize, discontinuous: &mut bool| {
                        if action_position > *p0 {
                            let s1 = *s0
                                + ppqn::pulses_to_samples(action_position - *p0, bpm, self.sample_rate).floor() as usize;
                            assert!(
                                s1 <= RENDER_QUANTUM,
                                "action at {action_position} resolves to sample {s1} beyond the quantum"
                            );
                            info.blocks.push(Block {
                                index,
                                p0: *p0,
                                p1: action_position,
                                s0: *s0,
                                s1,
                                bpm,
                                flags: flags(*discontinuous, self.tempo_changed, time_info),
                            });
                            index += 1;
                            *discontinuous = false;
                            *p0 = action_position;
                            *s0 = s1;
                        }
                    };
                    match action {
                        Action::Loop { target } => {
                            advance_to_action(&mut p0, &mut s0, &mut discontinuous);
                            p0 = target;
                            discontinuous = true;
                        }
                        Action::Marker { prev, next } => {
                            let prev_marker = &markers.markers[prev];
                            match self.current_marker {
                                Some(ref mut current) if current.marker == prev_marker.uuid => {
                                    current.repeat += 1;
                                    if current.repeat < prev_marker.plays || prev_marker.plays == 0 {
                                        advance_to_action(&mut p0, &mut s0, &mut discontinuous);
                                        p0 = prev_marker.position;
                                        discontinuous = true;
                                    } else {
                                        self.current_marker = next
                                            .map(|next| MarkerState { marker: markers.markers[next].uuid, repeat: 0 });
                                    }
                                }
                                _ => {
                                    self.current_marker = Some(MarkerState { marker: prev_marker.uuid, repeat: 0 });
                                }
                            }
                            marker_changed = true;
                        }
                        Action::Callback { position } => {
                            advance_to_action(&mut p0, &mut s0, &mut discontinuous);
                            let mut at = 0;
                            while at < self.callbacks.len() {
                                if self.callbacks[at].position == position {
                                    let scheduled = self.callbacks.remove(at);
                                    (scheduled.callback)(time_info);
                                } else {
                                    at += 1;
                                }
                            }
                        }
                    }
                }
            }
            self.tempo_changed = false;
        }
        // the jump target starts the next quantum
        self.pending_discontinuity = discontinuous;
        time_info.advance_to(p0);
        self.free_running_position = p0;
        marker_changed
    }

    fn process_stopped(&mut self, time_info: &mut TimeInfo, timeline: &Timeline, bpm: f64, info: &mut ProcessInfo) -> bool {
        let mut marker_changed = false;
        if self.markers_changed || time_info.take_leap() {
            self.markers_changed = false;
            if let Some(marker) = timeline.markers.lower_equal(time_info.position()) {
                if self.current_marker.map(|state| state.marker) != Some(marker.uuid) {
                    self.current_marker = Some(MarkerState { marker: marker.uuid, repeat: 0 });
                    marker_changed = true;
                }
            }
        }
        let p0 = self.free_running_position;
        let p1 = p0 + ppqn::samples_to_pulses(RENDER_QUANTUM as f64, bpm, self.sample_rate);
        info.blocks.push(Block { index: 0, p0, p1, s0: 0, s1: RENDER_QUANTUM, bpm, flags: BlockFlags::NONE });
        self.free_running_position = p1;
        marker_changed
    }
}
