//! The closed set of processing unit kinds registered in the graph.

use crate::audio_effects::AudioEffect;
use crate::block::ProcessInfo;
use crate::buffers::{BufferId, EventInputId};
use crate::instruments::Instrument;
use crate::mixer::{AudioBus, AuxSend, ChannelStrip};
use crate::note_chain::NoteChain;
use crate::processor::{AudioProcessor, EventProcessor, ProcessContext};
use crate::update_clock::UpdateClock;
use std::fmt;
use uuid::Uuid;

pub enum Unit {
    UpdateClock(UpdateClock),
    NoteChain(NoteChain),
    Instrument(Instrument),
    AudioBus(AudioBus),
    AudioEffect(AudioEffect),
    ChannelStrip(ChannelStrip),
    AuxSend(AuxSend),
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::UpdateClock(_) => write!(f, "UpdateClock"),
            Unit::NoteChain(chain) => write!(f, "NoteChain({})", chain.unit()),
            Unit::Instrument(instrument) => write!(f, "Instrument({})", instrument.uuid()),
            Unit::AudioBus(bus) => write!(f, "AudioBus({})", bus.unit()),
            Unit::AudioEffect(effect) => write!(f, "AudioEffect({})", effect.uuid()),
            Unit::ChannelStrip(strip) => write!(f, "ChannelStrip({})", strip.uuid()),
            Unit::AuxSend(send) => write!(f, "AuxSend({})", send.uuid()),
        }
    }
}

impl Unit {
    pub fn process(&mut self, ctx: &mut ProcessContext, info: &ProcessInfo) {
        match self {
            Unit::UpdateClock(clock) => clock.process(ctx, info),
            Unit::NoteChain(chain) => EventProcessor::process(chain, ctx, info),
            Unit::Instrument(instrument) => AudioProcessor::process(instrument, ctx, info),
            Unit::AudioBus(bus) => bus.process(ctx, info),
            Unit::AudioEffect(effect) => AudioProcessor::process(effect, ctx, info),
            Unit::ChannelStrip(strip) => AudioProcessor::process(strip, ctx, info),
            Unit::AuxSend(send) => AudioProcessor::process(send, ctx, info),
        }
    }

    /// Input receiving automation ticks and, for instruments, notes.
    pub fn event_input(&self) -> Option<EventInputId> {
        match self {
            Unit::UpdateClock(_) | Unit::AudioBus(_) => None,
            Unit::NoteChain(chain) => Some(EventProcessor::event_input(chain)),
            Unit::Instrument(instrument) => Some(instrument.input()),
            Unit::AudioEffect(effect) => AudioProcessor::event_input(effect),
            Unit::ChannelStrip(strip) => AudioProcessor::event_input(strip),
            Unit::AuxSend(send) => AudioProcessor::event_input(send),
        }
    }

    pub fn audio_output(&self) -> Option<BufferId> {
        match self {
            Unit::UpdateClock(_) | Unit::NoteChain(_) => None,
            Unit::Instrument(instrument) => Some(instrument.output()),
            Unit::AudioBus(bus) => Some(bus.output()),
            Unit::AudioEffect(effect) => Some(effect.output()),
            Unit::ChannelStrip(strip) => Some(strip.output()),
            Unit::AuxSend(send) => Some(send.output()),
        }
    }

    /// Sets the parameter if `device` lives in this unit.
    pub fn set_parameter(&mut self, device: Uuid, index: u16, value: f32) -> bool {
        match self {
            Unit::UpdateClock(_) | Unit::AudioBus(_) => false,
            Unit::NoteChain(chain) => chain.set_parameter(device, index, value),
            Unit::Instrument(instrument) => instrument.uuid() == device && instrument.set_parameter(index, value),
            Unit::AudioEffect(effect) => effect.uuid() == device && effect.set_parameter(index, value),
            Unit::ChannelStrip(strip) => strip.uuid() == device && strip.set_parameter(index, value),
            Unit::AuxSend(send) => send.uuid() == device && send.set_parameter(index, value),
        }
    }

    /// Connects the audio input of a chain link.
    pub fn set_audio_source(&mut self, source: Option<BufferId>) {
        match self {
            Unit::AudioEffect(effect) => effect.set_source(source),
            Unit::ChannelStrip(strip) => strip.set_source(source),
            Unit::AuxSend(send) => send.set_source(source),
            Unit::UpdateClock(_) | Unit::NoteChain(_) | Unit::Instrument(_) | Unit::AudioBus(_) => {
                debug_assert!(false, "{self} takes no audio source")
            }
        }
    }

    pub fn on_after_process(&mut self) {
        if let Unit::NoteChain(chain) = self {
            chain.on_after_process();
        }
    }

    pub fn reset(&mut self) {
        match self {
            Unit::UpdateClock(_) | Unit::AudioBus(_) | Unit::AuxSend(_) => {}
            Unit::NoteChain(chain) => chain.reset(),
            Unit::Instrument(instrument) => instrument.reset(),
            Unit::AudioEffect(effect) => effect.reset(),
            Unit::ChannelStrip(strip) => strip.reset(),
        }
    }

    pub fn as_update_clock_mut(&mut self) -> Option<&mut UpdateClock> {
        match self {
            Unit::UpdateClock(clock) => Some(clock),
            _ => None,
        }
    }

    pub fn as_note_chain_mut(&mut self) -> Option<&mut NoteChain> {
        match self {
            Unit::NoteChain(chain) => Some(chain),
            _ => None,
        }
    }

    pub fn as_audio_bus_mut(&mut self) -> Option<&mut AudioBus> {
        match self {
            Unit::AudioBus(bus) => Some(bus),
            _ => None,
        }
    }
}
