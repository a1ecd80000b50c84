//! A unit's note path: sequencer, then MIDI effects, then the instrument.

use crate::block::{Block, BlockFlags};
use crate::buffers::EventInputId;
use crate::events::{NoteEvent, NoteLifecycleEvent};
use crate::midi_effects::MidiEffect;
use crate::note_sequencer::{NoteEventSource, NoteSequencer};
use crate::processor::{EventProcessor, ProcessContext};
use tactus_shared::project::MidiEffectModel;
use tactus_shared::Ppqn;
use uuid::Uuid;

/// The sequencer followed by the first `effects.len()` effects of a chain.
pub struct ChainSource<'s> {
    pub sequencer: &'s mut NoteSequencer,
    pub effects: &'s mut [MidiEffect],
}

impl NoteEventSource for ChainSource<'_> {
    fn process_notes(
        &mut self,
        ctx: &mut ProcessContext,
        from: Ppqn,
        to: Ppqn,
        flags: BlockFlags,
        out: &mut Vec<NoteLifecycleEvent>,
    ) {
        match self.effects.split_last_mut() {
            Some((last, rest)) => {
                let mut source = ChainSource { sequencer: &mut *self.sequencer, effects: rest };
                last.process_notes(ctx, &mut source, from, to, flags, out);
            }
            None => self.sequencer.process_notes(ctx, from, to, flags, out),
        }
    }

    fn active_notes_at(&self, position: Ppqn, only_external: bool, out: &mut Vec<NoteEvent>) {
        chain_active_notes(self.sequencer, self.effects, position, only_external, out);
    }
}

fn chain_active_notes(
    sequencer: &NoteSequencer,
    effects: &[MidiEffect],
    position: Ppqn,
    only_external: bool,
    out: &mut Vec<NoteEvent>,
) {
    match effects.split_last() {
        None => sequencer.active_notes_at(position, only_external, out),
        Some((MidiEffect::Pitch(pitch), rest)) => {
            let mark = out.len();
            chain_active_notes(sequencer, rest, position, only_external, out);
            out[mark..].iter_mut().for_each(|note| pitch.transpose(note));
        }
        Some((MidiEffect::Arpeggio(arpeggio), _)) => {
            if !only_external {
                arpeggio.held(position, out);
            }
        }
    }
}

/// Pulls note lifecycle events through the chain and writes them into the
/// instrument's event input. Its own event input carries the automation
/// ticks of the effects' parameters.
pub struct NoteChain {
    unit: Uuid,
    input: EventInputId,
    sequencer: NoteSequencer,
    effects: Vec<MidiEffect>,
    bypassed: Vec<MidiEffect>,
    target: Option<EventInputId>,
    lifecycle: Vec<NoteLifecycleEvent>,
    release_pending: bool,
}

impl NoteChain {
    pub fn new(unit: Uuid, input: EventInputId, effects: &[MidiEffectModel]) -> Self {
        let mut chain = Self {
            unit,
            input,
            sequencer: NoteSequencer::new(unit),
            effects: Vec::new(),
            bypassed: Vec::new(),
            target: None,
            lifecycle: Vec::with_capacity(64),
            release_pending: false,
        };
        chain.rebuild(effects);
        chain.release_pending = false;
        chain
    }

    pub fn unit(&self) -> Uuid {
        self.unit
    }

    pub fn sequencer_mut(&mut self) -> &mut NoteSequencer {
        &mut self.sequencer
    }

    pub fn set_target(&mut self, target: Option<EventInputId>) {
        self.target = target;
    }

    /// Reorders the chain after the unit's effect list changed. Everything
    /// sounding is stopped at the start of the next block.
    pub fn rebuild(&mut self, models: &[MidiEffectModel]) {
        let mut pool: Vec<MidiEffect> = self.effects.drain(..).chain(self.bypassed.drain(..)).collect();
        for model in models {
            let effect = match pool.iter().position(|effect| effect.uuid() == model.uuid) {
                Some(index) => pool.swap_remove(index),
                None => MidiEffect::create(model),
            };
            if model.enabled {
                self.effects.push(effect);
            } else {
                self.bypassed.push(effect);
            }
        }
        self.release_pending = true;
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    pub fn contains_device(&self, device: Uuid) -> bool {
        self.effects.iter().chain(&self.bypassed).any(|effect| effect.uuid() == device)
    }

    pub fn set_parameter(&mut self, device: Uuid, index: u16, value: f32) -> bool {
        match self.effects.iter_mut().chain(self.bypassed.iter_mut()).find(|effect| effect.uuid() == device) {
            Some(effect) => {
                let applied = effect.parameters_mut().set(index, value);
                effect.parameters_changed();
                applied
            }
            None => false,
        }
    }

    pub fn on_after_process(&mut self) {
        self.sequencer.on_after_process();
    }

    pub fn reset(&mut self) {
        self.sequencer.reset();
        self.effects.iter_mut().chain(self.bypassed.iter_mut()).for_each(MidiEffect::reset);
        self.lifecycle.clear();
        self.release_pending = false;
    }

    fn release_everything(&mut self, ctx: &mut ProcessContext, from: Ppqn) {
        self.sequencer.release_all(ctx, from, &mut self.lifecycle);
        for effect in self.effects.iter_mut().chain(self.bypassed.iter_mut()) {
            effect.release_all(from, &mut self.lifecycle);
        }
    }
}

impl EventProcessor for NoteChain {
    fn event_input(&self) -> EventInputId {
        self.input
    }

    fn update_parameter(&mut self, ctx: &mut ProcessContext, position: Ppqn) {
        for effect in self.effects.iter_mut().chain(self.bypassed.iter_mut()) {
            if effect.parameters_mut().update(ctx.project, position) {
                effect.parameters_changed();
            }
        }
    }

    fn process_events(&mut self, ctx: &mut ProcessContext, block: &Block, from: Ppqn, to: Ppqn) {
        let Some(target) = self.target else {
            return;
        };
        // a jump only affects the first range of its block
        let mut flags = block.flags;
        if from != block.p0 {
            flags.set(BlockFlags::DISCONTINUOUS, false);
        }
        self.lifecycle.clear();
        if self.release_pending {
            self.release_pending = false;
            self.release_everything(ctx, from);
        }
        let mut source = ChainSource { sequencer: &mut self.sequencer, effects: &mut self.effects };
        source.process_notes(ctx, from, to, flags, &mut self.lifecycle);
        let events = ctx.events.get_mut(target);
        for event in self.lifecycle.drain(..) {
            events.add(block.index, event.into());
        }
    }
}
