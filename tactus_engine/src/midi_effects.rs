//! Note effects placed between a unit's sequencer and its instrument.

use crate::block::BlockFlags;
use crate::events::{NoteEvent, NoteLifecycleEvent};
use crate::note_sequencer::NoteEventSource;
use crate::parameter::Parameters;
use crate::processor::ProcessContext;
use crate::retainer::EventSpanRetainer;
use tactus_shared::ppqn::{fragments, Ppqn, BAR};
use tactus_shared::project::{ArpeggioMode, MidiEffectKind, MidiEffectModel};
use tactus_shared::{ParameterAddress, Project, ValueMapping};
use uuid::Uuid;

pub enum MidiEffect {
    Pitch(PitchEffect),
    Arpeggio(Arpeggio),
}

impl MidiEffect {
    pub fn create(model: &MidiEffectModel) -> Self {
        match &model.kind {
            MidiEffectKind::Pitch { octaves, semitones, cent } => {
                MidiEffect::Pitch(PitchEffect::new(model.uuid, *octaves, *semitones, *cent))
            }
            MidiEffectKind::Arpeggio { mode, rate, gate, repeat, octaves, velocity } => MidiEffect::Arpeggio(Arpeggio::new(
                model.uuid,
                ArpeggioSettings { mode: *mode, rate: *rate, gate: *gate, repeat: *repeat, octaves: *octaves, velocity: *velocity },
            )),
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            MidiEffect::Pitch(effect) => effect.uuid,
            MidiEffect::Arpeggio(effect) => effect.uuid,
        }
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        match self {
            MidiEffect::Pitch(effect) => &mut effect.parameters,
            MidiEffect::Arpeggio(effect) => &mut effect.parameters,
        }
    }

    /// Re-reads derived state after a parameter moved.
    pub fn parameters_changed(&mut self) {
        if let MidiEffect::Arpeggio(effect) = self {
            effect.read_parameters();
        }
    }

    pub fn process_notes(
        &mut self,
        ctx: &mut ProcessContext,
        source: &mut dyn NoteEventSource,
        from: Ppqn,
        to: Ppqn,
        flags: BlockFlags,
        out: &mut Vec<NoteLifecycleEvent>,
    ) {
        match self {
            MidiEffect::Pitch(effect) => effect.process_notes(ctx, source, from, to, flags, out),
            MidiEffect::Arpeggio(effect) => effect.process_notes(ctx, source, from, to, flags, out),
        }
    }

    /// Stops every note this effect started itself.
    pub fn release_all(&mut self, from: Ppqn, out: &mut Vec<NoteLifecycleEvent>) {
        if let MidiEffect::Arpeggio(effect) = self {
            out.extend(effect.retainer.release_all().map(|note| NoteLifecycleEvent::stop(&note, from)));
        }
    }

    pub fn reset(&mut self) {
        if let MidiEffect::Arpeggio(effect) = self {
            effect.retainer.clear();
        }
    }
}

pub const PITCH_OCTAVES: u16 = 0;
pub const PITCH_SEMITONES: u16 = 1;
pub const PITCH_CENT: u16 = 2;

/// Transposes note starts.
pub struct PitchEffect {
    uuid: Uuid,
    parameters: Parameters,
}

impl PitchEffect {
    pub fn new(uuid: Uuid, octaves: i32, semitones: i32, cent: f32) -> Self {
        let parameters = Parameters::new()
            .bind(ParameterAddress::new(uuid, PITCH_OCTAVES), ValueMapping::Integer { min: -7, max: 7 }, octaves as f32)
            .bind(ParameterAddress::new(uuid, PITCH_SEMITONES), ValueMapping::Integer { min: -36, max: 36 }, semitones as f32)
            .bind(ParameterAddress::new(uuid, PITCH_CENT), ValueMapping::Linear { min: -50.0, max: 50.0 }, cent);
        Self { uuid, parameters }
    }

    fn shift(&self, project: Option<&Project>, note: &mut NoteEvent) {
        let position = note.position;
        let value = |index| match project {
            Some(project) => self.parameters.value_at(project, index, position),
            None => self.parameters.get(index),
        };
        let semitones = value(PITCH_OCTAVES) as i32 * 12 + value(PITCH_SEMITONES) as i32;
        note.pitch = (note.pitch as i32 + semitones).clamp(0, 127) as u8;
        note.cent += value(PITCH_CENT);
    }

    /// Transposes notes a source reports as held.
    pub fn transpose(&self, note: &mut NoteEvent) {
        self.shift(None, note);
    }

    fn process_notes(
        &mut self,
        ctx: &mut ProcessContext,
        source: &mut dyn NoteEventSource,
        from: Ppqn,
        to: Ppqn,
        flags: BlockFlags,
        out: &mut Vec<NoteLifecycleEvent>,
    ) {
        let mark = out.len();
        source.process_notes(ctx, from, to, flags, out);
        for event in out[mark..].iter_mut() {
            if let NoteLifecycleEvent::Start(note) = event {
                self.shift(Some(ctx.project), note);
            }
        }
    }
}

pub const ARP_MODE: u16 = 0;
pub const ARP_RATE: u16 = 1;
pub const ARP_GATE: u16 = 2;
pub const ARP_REPEAT: u16 = 3;
pub const ARP_OCTAVES: u16 = 4;
pub const ARP_VELOCITY: u16 = 5;

/// Step lengths selectable by the rate parameter, as fractions of a bar.
pub const RATE_FRACTIONS: [(u32, u32); 17] = [
    (1, 1),
    (1, 2),
    (1, 3),
    (1, 4),
    (3, 16),
    (1, 6),
    (1, 8),
    (3, 32),
    (1, 12),
    (1, 16),
    (3, 64),
    (1, 24),
    (1, 32),
    (1, 48),
    (1, 64),
    (1, 96),
    (1, 128),
];

pub fn rate_to_pulses(index: usize) -> Ppqn {
    let (n, d) = RATE_FRACTIONS[index.min(RATE_FRACTIONS.len() - 1)];
    BAR * n as f64 / d as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArpeggioSettings {
    pub mode: ArpeggioMode,
    pub rate: usize,
    pub gate: f32,
    pub repeat: u32,
    pub octaves: u32,
    pub velocity: f32,
}

/// Shapes the velocity of generated steps. Negative settings fade towards
/// full velocity, positive ones scale the held note's velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
struct VelocityMatrix {
    mult: f32,
    add: f32,
}

impl VelocityMatrix {
    fn from_setting(velocity: f32) -> Self {
        if velocity <= 0.0 {
            Self { mult: 0.0, add: 1.0 + velocity }
        } else {
            Self { mult: velocity, add: 1.0 - velocity }
        }
    }

    fn apply(&self, velocity: f32) -> f32 {
        velocity * self.mult + self.add
    }
}

/// Steps through the notes its source holds at a fixed rate.
pub struct Arpeggio {
    uuid: Uuid,
    parameters: Parameters,
    settings: ArpeggioSettings,
    matrix: VelocityMatrix,
    stack: Vec<NoteEvent>,
    retainer: EventSpanRetainer<NoteEvent>,
}

impl Arpeggio {
    pub fn new(uuid: Uuid, settings: ArpeggioSettings) -> Self {
        let address = |index| ParameterAddress::new(uuid, index);
        let parameters = Parameters::new()
            .bind(address(ARP_MODE), ValueMapping::Integer { min: 0, max: 2 }, settings.mode.index())
            .bind(address(ARP_RATE), ValueMapping::Integer { min: 0, max: RATE_FRACTIONS.len() as i32 - 1 }, settings.rate as f32)
            .bind(address(ARP_GATE), ValueMapping::Linear { min: 0.0, max: 2.0 }, settings.gate)
            .bind(address(ARP_REPEAT), ValueMapping::Integer { min: 1, max: 16 }, settings.repeat as f32)
            .bind(address(ARP_OCTAVES), ValueMapping::Integer { min: 1, max: 5 }, settings.octaves as f32)
            .bind(address(ARP_VELOCITY), ValueMapping::Bipolar, settings.velocity);
        let mut arpeggio = Self {
            uuid,
            parameters,
            settings,
            matrix: VelocityMatrix::from_setting(settings.velocity),
            stack: Vec::with_capacity(16),
            retainer: EventSpanRetainer::new(),
        };
        arpeggio.read_parameters();
        arpeggio
    }

    pub fn settings(&self) -> ArpeggioSettings {
        self.settings
    }

    fn read_parameters(&mut self) {
        let p = &self.parameters;
        self.settings = ArpeggioSettings {
            mode: ArpeggioMode::from_index(p.get(ARP_MODE)),
            rate: p.get(ARP_RATE) as usize,
            gate: p.get(ARP_GATE),
            repeat: (p.get(ARP_REPEAT) as u32).max(1),
            octaves: (p.get(ARP_OCTAVES) as u32).max(1),
            velocity: p.get(ARP_VELOCITY),
        };
        self.matrix = VelocityMatrix::from_setting(self.settings.velocity);
    }

    fn process_notes(
        &mut self,
        ctx: &mut ProcessContext,
        source: &mut dyn NoteEventSource,
        from: Ppqn,
        to: Ppqn,
        flags: BlockFlags,
        out: &mut Vec<NoteLifecycleEvent>,
    ) {
        if !self.retainer.is_empty() {
            if flags.discontinuous() {
                out.extend(self.retainer.release_all().map(|note| NoteLifecycleEvent::stop(&note, from)));
            } else {
                out.extend(self.retainer.release_linear_completed(to).map(|note| NoteLifecycleEvent::stop(&note, note.complete())));
            }
        }
        // the source still has to advance, its own events are replaced
        let mark = out.len();
        source.process_notes(ctx, from, to, flags, out);
        out.truncate(mark);

        let rate = rate_to_pulses(self.settings.rate);
        let only_external = !flags.transporting();
        let duration = (rate * self.settings.gate as f64).floor().max(1.0);
        for fragment in fragments(from, to, rate) {
            self.stack.clear();
            source.active_notes_at(fragment.position, only_external, &mut self.stack);
            if self.stack.is_empty() {
                continue;
            }
            self.stack.sort_by_key(|note| note.pitch);
            let step = fragment.index.div_euclid(self.settings.repeat as i64);
            let (held, octave) = self.select(step);
            let event = NoteEvent {
                id: ctx.note_ids.next(),
                position: fragment.position,
                duration,
                pitch: (held.pitch as i64 + octave * 12).clamp(0, 127) as u8,
                velocity: self.matrix.apply(held.velocity),
                cent: held.cent,
            };
            self.retainer.add_and_retain(event);
            out.push(NoteLifecycleEvent::Start(event));
        }
        out.extend(self.retainer.release_linear_completed(to).map(|note| NoteLifecycleEvent::stop(&note, note.complete())));
    }

    /// Held note and octave offset of a step.
    fn select(&self, step: i64) -> (NoteEvent, i64) {
        let count = self.stack.len() as i64;
        let octaves = self.settings.octaves as i64;
        let amount = count * octaves;
        let (index, octave) = match self.settings.mode {
            ArpeggioMode::Up => (step % count, (step % amount) / count),
            ArpeggioMode::Down => (count - 1 - step % count, octaves - 1 - (step % amount) / count),
            ArpeggioMode::UpDown => {
                let sequence = (amount * 2 - 2).max(1);
                let at = step % sequence;
                let at = if at < amount { at } else { sequence - at };
                (at % count, at / count)
            }
        };
        (self.stack[index as usize], octave)
    }

    /// Notes this arpeggio currently sounds.
    pub fn held(&self, position: Ppqn, out: &mut Vec<NoteEvent>) {
        out.extend(self.retainer.overlapping(position).copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::harness::Harness;
    use tactus_shared::ppqn::QUARTER;

    /// Holds a fixed chord and emits nothing itself.
    struct Chord {
        pitches: Vec<u8>,
        processed: usize,
    }

    impl NoteEventSource for Chord {
        fn process_notes(&mut self, _: &mut ProcessContext, from: Ppqn, _: Ppqn, _: BlockFlags, out: &mut Vec<NoteLifecycleEvent>) {
            self.processed += 1;
            out.push(NoteLifecycleEvent::Stop { id: 99, pitch: 0, position: from });
        }

        fn active_notes_at(&self, position: Ppqn, _: bool, out: &mut Vec<NoteEvent>) {
            for (i, pitch) in self.pitches.iter().enumerate() {
                out.push(NoteEvent { id: i as u64, position, duration: Ppqn::INFINITY, pitch: *pitch, velocity: 0.5, cent: 0.0 });
            }
        }
    }

    fn arpeggio(mode: ArpeggioMode, octaves: u32) -> Arpeggio {
        // rate index 9 is a 1/16 step
        Arpeggio::new(Uuid::new_v4(), ArpeggioSettings { mode, rate: 9, gate: 0.5, repeat: 1, octaves, velocity: 0.0 })
    }

    fn run(arpeggio: &mut Arpeggio, pitches: &[u8], to: Ppqn) -> Vec<NoteLifecycleEvent> {
        let mut harness = Harness::new();
        let mut chord = Chord { pitches: pitches.to_vec(), processed: 0 };
        let mut out = Vec::new();
        let flags = BlockFlags::create(true, false, true, false);
        arpeggio.process_notes(&mut harness.context(), &mut chord, 0.0, to, flags, &mut out);
        assert_eq!(chord.processed, 1);
        out
    }

    fn pitches(events: &[NoteLifecycleEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|event| match event {
                NoteLifecycleEvent::Start(note) => Some(note.pitch),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_rates() {
        assert_eq!(rate_to_pulses(0), BAR);
        assert_eq!(rate_to_pulses(9), QUARTER / 4.0);
        assert_eq!(rate_to_pulses(99), BAR / 128.0);
    }

    #[test]
    fn test_up_over_two_octaves() {
        let mut arp = arpeggio(ArpeggioMode::Up, 2);
        let events = run(&mut arp, &[64, 60], QUARTER * 2.0);
        assert_eq!(pitches(&events), vec![60, 64, 72, 76, 60, 64, 72, 76]);
    }

    #[test]
    fn test_down_and_up_down() {
        let mut arp = arpeggio(ArpeggioMode::Down, 1);
        assert_eq!(pitches(&run(&mut arp, &[60, 64, 67], QUARTER)), vec![67, 64, 60, 67]);

        let mut arp = arpeggio(ArpeggioMode::UpDown, 1);
        assert_eq!(pitches(&run(&mut arp, &[60, 64, 67], QUARTER * 2.0)), vec![60, 64, 67, 64, 60, 64, 67, 64]);
    }

    #[test]
    fn test_steps_release_at_gate() {
        let mut arp = arpeggio(ArpeggioMode::Up, 1);
        let events = run(&mut arp, &[60], QUARTER / 4.0);
        // one step of 240 pulses, gated to half
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], NoteLifecycleEvent::Start(note) if note.duration == 120.0 && note.velocity == 1.0));
        assert!(matches!(events[1], NoteLifecycleEvent::Stop { position, .. } if position == 120.0));
    }

    #[test]
    fn test_velocity_matrix() {
        assert_eq!(VelocityMatrix::from_setting(0.0).apply(0.3), 1.0);
        assert_eq!(VelocityMatrix::from_setting(1.0).apply(0.3), 0.3);
        assert_eq!(VelocityMatrix::from_setting(-0.5).apply(0.3), 0.5);
    }

    #[test]
    fn test_pitch_shifts_starts_only() {
        let mut harness = Harness::new();
        let mut effect = PitchEffect::new(Uuid::new_v4(), 1, -2, 10.0);

        struct One;
        impl NoteEventSource for One {
            fn process_notes(&mut self, _: &mut ProcessContext, from: Ppqn, _: Ppqn, _: BlockFlags, out: &mut Vec<NoteLifecycleEvent>) {
                out.push(NoteLifecycleEvent::Start(NoteEvent { id: 1, position: from, duration: 10.0, pitch: 60, velocity: 1.0, cent: 0.0 }));
                out.push(NoteLifecycleEvent::Stop { id: 7, pitch: 50, position: from });
            }
            fn active_notes_at(&self, _: Ppqn, _: bool, _: &mut Vec<NoteEvent>) {}
        }

        let mut out = Vec::new();
        effect.process_notes(&mut harness.context(), &mut One, 0.0, 8.0, BlockFlags::NONE, &mut out);
        assert!(matches!(out[0], NoteLifecycleEvent::Start(note) if note.pitch == 70 && (note.cent - 10.0).abs() < 1e-4));
        assert_eq!(out[1], NoteLifecycleEvent::Stop { id: 7, pitch: 50, position: 0.0 });
    }
}
