//! The event-interleaved processing contract.
//!
//! A processor renders its continuous output between events and applies
//! each event exactly at its position within the sub-block. Audio
//! processors advance a sample cursor, event processors a pulse cursor.

use crate::block::{Block, ProcessInfo};
use crate::buffers::{AudioArena, EventArena, EventInputId};
use crate::clip_sequencer::ClipSequencer;
use crate::commands::Notifier;
use crate::events::{Event, NoteIds};
use crate::samples::SamplePool;
use crate::telemetry::Telemetry;
use crate::time_info::TimeInfo;
use tactus_shared::ppqn::{self, Ppqn};
use tactus_shared::Project;

/// Positions closer than this resolve to the sub-block start.
pub const POSITION_EPSILON: Ppqn = 1.0e-7;

/// Everything a processor may touch during one render callback.
pub struct ProcessContext<'a> {
    pub sample_rate: f32,
    pub time_info: &'a TimeInfo,
    pub project: &'a Project,
    pub audio: &'a mut AudioArena,
    pub events: &'a mut EventArena,
    pub clips: &'a mut ClipSequencer,
    pub samples: &'a SamplePool,
    pub telemetry: &'a mut Telemetry,
    pub notifier: &'a Notifier,
    pub note_ids: &'a mut NoteIds,
}

fn event_at(ctx: &ProcessContext, input: EventInputId, block: usize, index: usize) -> Event {
    ctx.events.get(input).get(block)[index]
}

/// Sample offset of `position` within `block`.
pub fn resolve_sample_index(block: &Block, position: Ppqn, sample_rate: f32) -> usize {
    let pulses = position - block.p0;
    let offset = if pulses.abs() < POSITION_EPSILON {
        0.0
    } else {
        ppqn::pulses_to_samples(pulses, block.bpm, sample_rate as f64).floor()
    };
    // signed until checked, a position before p0 must not saturate to s0
    let index = block.s0 as f64 + offset;
    assert!(
        block.s0 as f64 <= index && index <= block.s1 as f64,
        "event at {position} resolves to sample {index} outside [{}, {}] (p0 {})",
        block.s0,
        block.s1,
        block.p0
    );
    index as usize
}

pub trait AudioProcessor {
    fn event_input(&self) -> Option<EventInputId> {
        None
    }

    fn introduce_block(&mut self, _ctx: &mut ProcessContext, _block: &Block) {}

    fn handle_event(&mut self, _ctx: &mut ProcessContext, _block: &Block, _event: &Event) {}

    /// Re-samples automated parameters at `position`.
    fn update_parameter(&mut self, _ctx: &mut ProcessContext, _position: Ppqn) {}

    /// Renders samples `[from, to)` of the quantum.
    fn process_audio(&mut self, ctx: &mut ProcessContext, block: &Block, from: usize, to: usize);

    fn finish_process(&mut self, _ctx: &mut ProcessContext) {}

    fn process(&mut self, ctx: &mut ProcessContext, info: &ProcessInfo) {
        let input = self.event_input();
        for block in &info.blocks {
            self.introduce_block(ctx, block);
            let mut from = block.s0;
            if let Some(input) = input {
                let mut pending: Option<Event> = None;
                let count = ctx.events.get(input).get(block.index).len();
                for index in 0..count {
                    let event = event_at(ctx, input, block.index, index);
                    let to = resolve_sample_index(block, event.position(), ctx.sample_rate);
                    if let Some(pending) = pending.take() {
                        self.handle_event(ctx, block, &pending);
                    }
                    if from < to {
                        self.process_audio(ctx, block, from, to);
                        from = to;
                    }
                    if event.is_update() {
                        self.update_parameter(ctx, event.position());
                    } else {
                        pending = Some(event);
                    }
                }
                if let Some(pending) = pending {
                    self.handle_event(ctx, block, &pending);
                }
            }
            if from < block.s1 {
                self.process_audio(ctx, block, from, block.s1);
            }
        }
        if let Some(input) = input {
            ctx.events.get_mut(input).clear();
        }
        self.finish_process(ctx);
    }
}

pub trait EventProcessor {
    fn event_input(&self) -> EventInputId;

    fn introduce_block(&mut self, _ctx: &mut ProcessContext, _block: &Block) {}

    fn handle_event(&mut self, _ctx: &mut ProcessContext, _block: &Block, _event: &Event) {}

    fn update_parameter(&mut self, _ctx: &mut ProcessContext, _position: Ppqn) {}

    /// Advances over the pulse range `[from, to)` of `block`.
    fn process_events(&mut self, ctx: &mut ProcessContext, block: &Block, from: Ppqn, to: Ppqn);

    fn process(&mut self, ctx: &mut ProcessContext, info: &ProcessInfo) {
        let input = self.event_input();
        for block in &info.blocks {
            self.introduce_block(ctx, block);
            let mut position = block.p0;
            let mut pending: Option<Event> = None;
            let count = ctx.events.get(input).get(block.index).len();
            for index in 0..count {
                let event = event_at(ctx, input, block.index, index);
                if let Some(pending) = pending.take() {
                    self.handle_event(ctx, block, &pending);
                }
                if event.position() - position > POSITION_EPSILON {
                    self.process_events(ctx, block, position, event.position());
                    position = event.position();
                }
                if event.is_update() {
                    self.update_parameter(ctx, event.position());
                } else {
                    pending = Some(event);
                }
            }
            if let Some(pending) = pending {
                self.handle_event(ctx, block, &pending);
            }
            if position < block.p1 {
                self.process_events(ctx, block, position, block.p1);
            }
        }
        ctx.events.get_mut(input).clear();
    }
}

#[cfg(test)]
pub(crate) mod harness {
    //! A self-contained context for driving processors in tests.

    use super::*;
    use crate::commands::EngineNotification;
    use crate::telemetry::{self, TelemetryReceiver};
    use crossbeam_channel::Receiver;

    pub struct Harness {
        pub sample_rate: f32,
        pub time_info: TimeInfo,
        pub project: Project,
        pub audio: AudioArena,
        pub events: EventArena,
        pub clips: ClipSequencer,
        pub samples: SamplePool,
        pub telemetry: Telemetry,
        pub telemetry_receiver: TelemetryReceiver,
        pub notifier: Notifier,
        pub notifications: Receiver<EngineNotification>,
        pub note_ids: NoteIds,
    }

    impl Harness {
        pub fn new() -> Self {
            let (telemetry, telemetry_receiver) = telemetry::channel(256);
            let (sender, notifications) = crossbeam_channel::bounded(64);
            Self {
                sample_rate: 48000.0,
                time_info: TimeInfo::default(),
                project: Project::default(),
                audio: AudioArena::new(),
                events: EventArena::new(),
                clips: ClipSequencer::new(),
                samples: SamplePool::default(),
                telemetry,
                telemetry_receiver,
                notifier: Notifier::new(sender),
                notifications,
                note_ids: NoteIds::default(),
            }
        }

        pub fn context(&mut self) -> ProcessContext<'_> {
            ProcessContext {
                sample_rate: self.sample_rate,
                time_info: &self.time_info,
                project: &self.project,
                audio: &mut self.audio,
                events: &mut self.events,
                clips: &mut self.clips,
                samples: &self.samples,
                telemetry: &mut self.telemetry,
                notifier: &self.notifier,
                note_ids: &mut self.note_ids,
            }
        }
    }

    /// A transporting block at a tempo where one sample is 1/16 pulse.
    pub fn block(index: usize, p0: Ppqn, s0: usize, s1: usize) -> Block {
        use crate::block::BlockFlags;
        let bpm = 187.5;
        Block {
            index,
            p0,
            p1: p0 + (s1 - s0) as f64 / 16.0,
            s0,
            s1,
            bpm,
            flags: BlockFlags::create(true, false, true, false),
        }
    }
}
