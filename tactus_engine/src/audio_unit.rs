//! One audio unit's device chain: input, insert effects, aux sends and the
//! channel strip, plus the graph edges that order them.
//!
//! Structural edits only tear the wiring down. The actual edges are laid
//! again once, at the `Before` phase of the next callback.

use crate::audio_effects::AudioEffect;
use crate::buffers::{AudioArena, BufferId, EventArena};
use crate::config::AudioUnitOptions;
use crate::error::{EngineError, Result};
use crate::graph::{EdgeKey, ProcessorGraph, ProcessorKey};
use crate::instruments::Instrument;
use crate::mixer::{AudioBus, AuxSend, ChannelStrip};
use crate::note_chain::NoteChain;
use crate::units::Unit;
use crossbeam_channel::Sender;
use log::debug;
use std::collections::HashMap;
use tactus_shared::project::{AudioEffectModel, AudioUnitKind, AudioUnitModel, AuxSendModel, MidiEffectModel};
use uuid::Uuid;

/// Registers units in the graph together with their shared resources.
pub struct UnitHost<'a> {
    pub graph: &'a mut ProcessorGraph<Unit>,
    pub audio: &'a mut AudioArena,
    pub events: &'a mut EventArena,
    pub clock: ProcessorKey,
    pub sample_rate: f32,
    /// Removed units are handed off here so they are not freed on the audio thread.
    pub garbage: &'a Sender<Unit>,
}

impl UnitHost<'_> {
    /// Adds `unit` and, if it takes events, subscribes it to the update clock.
    pub fn register(&mut self, unit: Unit) -> Result<ProcessorKey> {
        let input = unit.event_input();
        let key = self.graph.register_processor(unit);
        if let Some(input) = input {
            if let Some(clock) = self.graph.get_mut(self.clock).and_then(Unit::as_update_clock_mut) {
                clock.subscribe(input);
            }
            self.graph.register_edge(self.clock, key)?;
        }
        Ok(key)
    }

    pub fn unregister(&mut self, key: ProcessorKey) {
        let Some(unit) = self.graph.unregister_processor(key) else {
            return;
        };
        if let Some(input) = unit.event_input() {
            if let Some(clock) = self.graph.get_mut(self.clock).and_then(Unit::as_update_clock_mut) {
                clock.unsubscribe(input);
            }
            self.events.release(input);
        }
        if let Some(output) = unit.audio_output() {
            self.audio.release(output);
        }
        // a full queue drops the unit right here
        let _ = self.garbage.try_send(unit);
    }
}

enum UnitInput {
    Instrument { chain: ProcessorKey, instrument: ProcessorKey },
    Bus(ProcessorKey),
}

struct EffectSlot {
    uuid: Uuid,
    key: ProcessorKey,
    output: BufferId,
    enabled: bool,
}

struct SendSlot {
    uuid: Uuid,
    key: ProcessorKey,
    output: BufferId,
    target: Uuid,
}

pub struct AudioUnit {
    uuid: Uuid,
    is_output: bool,
    options: AudioUnitOptions,
    input: UnitInput,
    input_output: BufferId,
    effects: Vec<EffectSlot>,
    sends: Vec<SendSlot>,
    strip: ProcessorKey,
    strip_output: BufferId,
    wiring: Vec<EdgeKey>,
    sourced: Vec<ProcessorKey>,
    bus_links: Vec<(ProcessorKey, BufferId)>,
    needs_wiring: bool,
}

impl AudioUnit {
    pub fn new(model: &AudioUnitModel, options: AudioUnitOptions, host: &mut UnitHost) -> Result<Self> {
        let (input, input_output) = match &model.kind {
            AudioUnitKind::Instrument(instrument) => {
                let notes = host.events.allocate();
                let output = host.audio.allocate();
                let mut device = Instrument::create(instrument, notes, output);
                device.attach_note_source(model.uuid);
                let mut chain = NoteChain::new(model.uuid, host.events.allocate(), &model.midi_effects);
                chain.set_target(Some(notes));
                let instrument = host.register(Unit::Instrument(device))?;
                let chain = host.register(Unit::NoteChain(chain))?;
                host.graph.register_edge(chain, instrument)?;
                (UnitInput::Instrument { chain, instrument }, output)
            }
            AudioUnitKind::Bus | AudioUnitKind::Output => {
                let output = host.audio.allocate();
                let bus = host.register(Unit::AudioBus(AudioBus::new(model.uuid, output)))?;
                (UnitInput::Bus(bus), output)
            }
        };
        let strip_output = host.audio.allocate();
        let strip = ChannelStrip::new(model.uuid, &model.channel_strip, host.events.allocate(), strip_output);
        let strip = host.register(Unit::ChannelStrip(strip))?;
        let mut unit = Self {
            uuid: model.uuid,
            is_output: model.is_output(),
            options,
            input,
            input_output,
            effects: Vec::new(),
            sends: Vec::new(),
            strip,
            strip_output,
            wiring: Vec::new(),
            sourced: Vec::new(),
            bus_links: Vec::new(),
            needs_wiring: true,
        };
        unit.sync_audio_effects(&model.audio_effects, host)?;
        unit.sync_sends(&model.aux_sends, host)?;
        Ok(unit)
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn is_output(&self) -> bool {
        self.is_output
    }

    /// Post-strip output of this unit.
    pub fn output(&self) -> BufferId {
        self.strip_output
    }

    pub fn needs_wiring(&self) -> bool {
        self.needs_wiring
    }

    /// The summing bus of bus and output units.
    pub fn bus(&self) -> Option<ProcessorKey> {
        match self.input {
            UnitInput::Bus(key) => Some(key),
            UnitInput::Instrument { .. } => None,
        }
    }

    pub fn note_chain(&self) -> Option<ProcessorKey> {
        match self.input {
            UnitInput::Instrument { chain, .. } => Some(chain),
            UnitInput::Bus(_) => None,
        }
    }

    fn input_key(&self) -> ProcessorKey {
        match self.input {
            UnitInput::Instrument { instrument, .. } => instrument,
            UnitInput::Bus(key) => key,
        }
    }

    fn keys(&self) -> impl Iterator<Item = ProcessorKey> + '_ {
        let input = match self.input {
            UnitInput::Instrument { chain, instrument } => [Some(chain), Some(instrument)],
            UnitInput::Bus(key) => [Some(key), None],
        };
        input
            .into_iter()
            .flatten()
            .chain(self.effects.iter().map(|slot| slot.key))
            .chain(self.sends.iter().map(|slot| slot.key))
            .chain(std::iter::once(self.strip))
    }

    /// Tears down every edge and source link laid by `wire`.
    pub fn invalidate_wiring(&mut self, graph: &mut ProcessorGraph<Unit>) {
        for edge in self.wiring.drain(..) {
            graph.unregister_edge(edge);
        }
        for (bus, source) in self.bus_links.drain(..) {
            if let Some(bus) = graph.get_mut(bus).and_then(Unit::as_audio_bus_mut) {
                bus.remove_source(source);
            }
        }
        for key in self.sourced.drain(..) {
            if let Some(unit) = graph.get_mut(key) {
                unit.set_audio_source(None);
            }
        }
        self.needs_wiring = true;
    }

    /// Lays the chain `input -> effects -> strip -> output bus`, with sends
    /// tapped before the strip. Returns false if the unit has no output bus
    /// to feed and stays silent.
    pub fn wire(
        &mut self,
        graph: &mut ProcessorGraph<Unit>,
        buses: &HashMap<Uuid, ProcessorKey>,
        output: Option<Uuid>,
    ) -> Result<bool> {
        self.needs_wiring = false;
        let output_bus = output.and_then(|uuid| buses.get(&uuid).copied());
        if output_bus.is_none() && !self.is_output {
            return Ok(false);
        }
        let mut source_key = self.input_key();
        let mut source = self.input_output;
        if self.options.include_audio_effects {
            let enabled: Vec<(ProcessorKey, BufferId)> =
                self.effects.iter().filter(|slot| slot.enabled).map(|slot| (slot.key, slot.output)).collect();
            for (key, output) in enabled {
                self.link(graph, source_key, key, source)?;
                source_key = key;
                source = output;
            }
        }
        if self.options.include_sends {
            let sends: Vec<(ProcessorKey, BufferId, Uuid)> =
                self.sends.iter().map(|slot| (slot.key, slot.output, slot.target)).collect();
            for (key, output, target) in sends {
                let Some(bus) = buses.get(&target).copied() else {
                    debug!("send of {} targets missing bus {target}", self.uuid);
                    continue;
                };
                self.link(graph, source_key, key, source)?;
                self.feed(graph, key, bus, output)?;
            }
        }
        self.link(graph, source_key, self.strip, source)?;
        if let Some(bus) = output_bus.filter(|_| !self.is_output) {
            self.feed(graph, self.strip, bus, self.strip_output)?;
        }
        Ok(true)
    }

    fn link(
        &mut self,
        graph: &mut ProcessorGraph<Unit>,
        source_key: ProcessorKey,
        target: ProcessorKey,
        source: BufferId,
    ) -> Result<()> {
        let unit = graph.get_mut(target).ok_or(EngineError::UnknownProcessor)?;
        unit.set_audio_source(Some(source));
        self.sourced.push(target);
        self.wiring.push(graph.register_edge(source_key, target)?);
        Ok(())
    }

    fn feed(&mut self, graph: &mut ProcessorGraph<Unit>, source_key: ProcessorKey, bus: ProcessorKey, output: BufferId) -> Result<()> {
        let target = graph.get_mut(bus).and_then(Unit::as_audio_bus_mut).ok_or(EngineError::UnknownProcessor)?;
        target.add_source(output);
        self.bus_links.push((bus, output));
        self.wiring.push(graph.register_edge(source_key, bus)?);
        Ok(())
    }

    /// Brings the insert effects in line with `models`: new ones are
    /// created, missing ones unregistered, the rest reordered in place.
    pub fn sync_audio_effects(&mut self, models: &[AudioEffectModel], host: &mut UnitHost) -> Result<()> {
        self.invalidate_wiring(host.graph);
        let mut pool: Vec<EffectSlot> = self.effects.drain(..).collect();
        let mut next = Vec::with_capacity(models.len());
        for model in models {
            let mut slot = match pool.iter().position(|slot| slot.uuid == model.uuid) {
                Some(index) => pool.swap_remove(index),
                None => {
                    let output = host.audio.allocate();
                    let effect = AudioEffect::create(model, host.events.allocate(), output, host.sample_rate);
                    let key = host.register(Unit::AudioEffect(effect))?;
                    EffectSlot { uuid: model.uuid, key, output, enabled: model.enabled }
                }
            };
            slot.enabled = model.enabled;
            next.push(slot);
        }
        for slot in pool {
            host.unregister(slot.key);
        }
        self.effects = next;
        Ok(())
    }

    pub fn sync_sends(&mut self, models: &[AuxSendModel], host: &mut UnitHost) -> Result<()> {
        self.invalidate_wiring(host.graph);
        let mut pool: Vec<SendSlot> = self.sends.drain(..).collect();
        let mut next = Vec::with_capacity(models.len());
        for model in models {
            let slot = match pool.iter().position(|slot| slot.uuid == model.uuid) {
                Some(index) => pool.swap_remove(index),
                None => {
                    let output = host.audio.allocate();
                    let send = AuxSend::new(model, host.events.allocate(), output);
                    let key = host.register(Unit::AuxSend(send))?;
                    SendSlot { uuid: model.uuid, key, output, target: model.target }
                }
            };
            next.push(slot);
        }
        for slot in pool {
            host.unregister(slot.key);
        }
        self.sends = next;
        Ok(())
    }

    /// Rebuilds the note chain. Returns false for units without one.
    pub fn sync_midi_effects(&mut self, models: &[MidiEffectModel], graph: &mut ProcessorGraph<Unit>) -> bool {
        let chain = self.note_chain().and_then(|key| graph.get_mut(key)).and_then(Unit::as_note_chain_mut);
        match chain {
            Some(chain) => {
                chain.rebuild(models);
                true
            }
            None => false,
        }
    }

    pub fn push_note_on(&self, graph: &mut ProcessorGraph<Unit>, pitch: u8, velocity: f32) -> bool {
        let chain = self.note_chain().and_then(|key| graph.get_mut(key)).and_then(Unit::as_note_chain_mut);
        match chain {
            Some(chain) => {
                chain.sequencer_mut().push_note_on(pitch, velocity);
                true
            }
            None => false,
        }
    }

    pub fn push_note_off(&self, graph: &mut ProcessorGraph<Unit>, pitch: u8) -> bool {
        let chain = self.note_chain().and_then(|key| graph.get_mut(key)).and_then(Unit::as_note_chain_mut);
        match chain {
            Some(chain) => {
                chain.sequencer_mut().push_note_off(pitch);
                true
            }
            None => false,
        }
    }

    /// Forwards a parameter change to whichever device of this unit owns it.
    pub fn set_parameter(&self, graph: &mut ProcessorGraph<Unit>, device: Uuid, index: u16, value: f32) -> bool {
        let keys: Vec<ProcessorKey> = self.keys().collect();
        keys.into_iter()
            .any(|key| graph.get_mut(key).is_some_and(|unit| unit.set_parameter(device, index, value)))
    }

    /// Unregisters every unit of the chain.
    pub fn terminate(mut self, host: &mut UnitHost) {
        self.invalidate_wiring(host.graph);
        let keys: Vec<ProcessorKey> = self.keys().collect();
        for key in keys {
            host.unregister(key);
        }
    }
}
