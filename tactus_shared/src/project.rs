//! Read-only project snapshot handed to the engine, plus the change
//! notifications that keep the engine's copy in sync with the controller.

use crate::error::UpdateError;
use crate::ppqn::{Ppqn, BAR};
use crate::value::{AutomationLane, ParameterAddress, ValuePoint};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub nominator: u32,
    pub denominator: u32,
}

impl Default for Signature {
    fn default() -> Self {
        Self { nominator: 4, denominator: 4 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopArea {
    pub from: Ppqn,
    pub to: Ppqn,
    pub enabled: bool,
}

impl Default for LoopArea {
    fn default() -> Self {
        Self { from: 0.0, to: BAR * 4.0, enabled: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub uuid: Uuid,
    pub position: Ppqn,
    /// How often the section starting here plays. Zero repeats forever.
    pub plays: u32,
    pub label: String,
}

impl Marker {
    pub fn new(position: Ppqn, plays: u32) -> Self {
        Self { uuid: Uuid::new_v4(), position, plays, label: String::new() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerTrack {
    pub enabled: bool,
    /// Sorted by position.
    pub markers: Vec<Marker>,
}

impl MarkerTrack {
    pub fn new(enabled: bool, mut markers: Vec<Marker>) -> Self {
        markers.sort_by(|a, b| a.position.total_cmp(&b.position));
        Self { enabled, markers }
    }

    /// Index of the last marker at or before `position`.
    pub fn floor_index(&self, position: Ppqn) -> Option<usize> {
        self.markers.partition_point(|marker| marker.position <= position).checked_sub(1)
    }

    pub fn lower_equal(&self, position: Ppqn) -> Option<&Marker> {
        self.floor_index(position).map(|index| &self.markers[index])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub bpm: f64,
    pub signature: Signature,
    pub loop_area: LoopArea,
    pub markers: MarkerTrack,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEventModel {
    pub position: Ppqn,
    pub duration: Ppqn,
    pub pitch: u8,
    pub velocity: f32,
    pub cent: f32,
    /// Probability in percent that the note plays at all.
    pub chance: f32,
    /// Repeats the note this many times within its duration.
    pub play_count: u32,
    /// Bends the repeat spacing. Zero spaces repeats evenly.
    pub play_curve: f32,
}

impl NoteEventModel {
    pub fn new(position: Ppqn, duration: Ppqn, pitch: u8, velocity: f32) -> Self {
        Self { position, duration, pitch, velocity, cent: 0.0, chance: 100.0, play_count: 1, play_curve: 0.0 }
    }
}

/// Maps the repeat ratio through the play curve.
pub fn curve_func(ratio: f64, curve: f64) -> f64 {
    if curve.abs() < 1e-6 {
        ratio
    } else {
        ratio.max(0.0).powf(2f64.powf(curve))
    }
}

/// Inverse of [`curve_func`] for non-negative ratios.
pub fn inverse_curve_func(ratio: f64, curve: f64) -> f64 {
    if curve.abs() < 1e-6 {
        ratio
    } else {
        ratio.max(0.0).powf(1.0 / 2f64.powf(curve))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoteCollection {
    /// Sorted by position.
    pub notes: Vec<NoteEventModel>,
}

impl NoteCollection {
    pub fn new(mut notes: Vec<NoteEventModel>) -> Self {
        notes.sort_by(|a, b| a.position.total_cmp(&b.position));
        Self { notes }
    }

    pub fn max_duration(&self) -> Ppqn {
        self.notes.iter().map(|note| note.duration).fold(0.0, f64::max)
    }

    /// Notes starting within `[from, to)`.
    pub fn range(&self, from: Ppqn, to: Ppqn) -> &[NoteEventModel] {
        let start = self.notes.partition_point(|note| note.position < from);
        let end = self.notes.partition_point(|note| note.position < to);
        &self.notes[start..end.max(start)]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRegion {
    pub uuid: Uuid,
    pub position: Ppqn,
    pub duration: Ppqn,
    /// Local offset of the loop cycle relative to the region start.
    pub loop_offset: Ppqn,
    pub loop_duration: Ppqn,
    pub mute: bool,
    pub events: NoteCollection,
}

impl NoteRegion {
    pub fn new(position: Ppqn, duration: Ppqn, events: NoteCollection) -> Self {
        Self { uuid: Uuid::new_v4(), position, duration, loop_offset: 0.0, loop_duration: duration, mute: false, events }
    }

    pub fn complete(&self) -> Ppqn {
        self.position + self.duration
    }

    /// Loop cycles of this region intersecting `[from, to)`.
    pub fn loop_cycles(&self, from: Ppqn, to: Ppqn) -> LoopCycles {
        let offset = self.position - self.loop_offset;
        let seek_min = self.position.max(from);
        let seek_max = self.complete().min(to);
        let index = if self.loop_duration > 0.0 { ((seek_min - offset) / self.loop_duration).floor() as i64 } else { 0 };
        LoopCycles { offset, loop_duration: self.loop_duration, seek_min, seek_max, index }
    }
}

/// One pass through a region's loop, clipped to a search range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopCycle {
    pub index: i64,
    /// Unclipped start of the pass, where local position zero lies.
    pub raw_start: Ppqn,
    pub result_start: Ppqn,
    pub result_end: Ppqn,
}

#[derive(Debug, Clone)]
pub struct LoopCycles {
    offset: Ppqn,
    loop_duration: Ppqn,
    seek_min: Ppqn,
    seek_max: Ppqn,
    index: i64,
}

impl Iterator for LoopCycles {
    type Item = LoopCycle;

    fn next(&mut self) -> Option<LoopCycle> {
        if self.loop_duration <= 0.0 || self.seek_min >= self.seek_max {
            return None;
        }
        let raw_start = self.offset + self.index as f64 * self.loop_duration;
        if raw_start >= self.seek_max {
            return None;
        }
        let cycle = LoopCycle {
            index: self.index,
            raw_start,
            result_start: raw_start.max(self.seek_min),
            result_end: (raw_start + self.loop_duration).min(self.seek_max),
        };
        self.index += 1;
        Some(cycle)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteClip {
    pub uuid: Uuid,
    pub duration: Ppqn,
    pub looping: bool,
    pub mute: bool,
    pub events: NoteCollection,
}

impl NoteClip {
    pub fn new(duration: Ppqn, looping: bool, events: NoteCollection) -> Self {
        Self { uuid: Uuid::new_v4(), duration, looping, mute: false, events }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackModel {
    pub uuid: Uuid,
    pub enabled: bool,
    /// Sorted by position, non-overlapping.
    pub regions: Vec<NoteRegion>,
    pub clips: Vec<NoteClip>,
}

impl TrackModel {
    pub fn new() -> Self {
        Self { uuid: Uuid::new_v4(), enabled: true, regions: Vec::new(), clips: Vec::new() }
    }

    /// Regions intersecting `[from, to)`.
    pub fn regions_in(&self, from: Ppqn, to: Ppqn) -> impl Iterator<Item = &NoteRegion> {
        self.regions.iter().filter(move |region| region.position < to && region.complete() > from)
    }
}

impl Default for TrackModel {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform {
    Sine,
    Saw,
    Square,
}

impl Waveform {
    pub fn from_index(value: f32) -> Self {
        match value.round() as i32 {
            0 => Waveform::Sine,
            1 => Waveform::Saw,
            _ => Waveform::Square,
        }
    }

    pub fn index(&self) -> f32 {
        match self {
            Waveform::Sine => 0.0,
            Waveform::Saw => 1.0,
            Waveform::Square => 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstrumentKind {
    Synth { waveform: Waveform, volume_db: f32, attack: f32, release: f32 },
    Sampler { sample: Uuid, volume_db: f32, root_key: u8 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentModel {
    pub uuid: Uuid,
    pub kind: InstrumentKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArpeggioMode {
    Up,
    Down,
    UpDown,
}

impl ArpeggioMode {
    pub fn from_index(value: f32) -> Self {
        match value.round() as i32 {
            0 => ArpeggioMode::Up,
            1 => ArpeggioMode::Down,
            _ => ArpeggioMode::UpDown,
        }
    }

    pub fn index(&self) -> f32 {
        match self {
            ArpeggioMode::Up => 0.0,
            ArpeggioMode::Down => 1.0,
            ArpeggioMode::UpDown => 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MidiEffectKind {
    Pitch { octaves: i32, semitones: i32, cent: f32 },
    Arpeggio { mode: ArpeggioMode, rate: usize, gate: f32, repeat: u32, octaves: u32, velocity: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiEffectModel {
    pub uuid: Uuid,
    pub enabled: bool,
    pub kind: MidiEffectKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AudioEffectKind {
    StereoTool { volume_db: f32, panning: f32 },
    Delay { delay: usize, feedback: f32, wet: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioEffectModel {
    pub uuid: Uuid,
    pub enabled: bool,
    pub kind: AudioEffectKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxSendModel {
    pub uuid: Uuid,
    /// Audio unit whose bus receives the send.
    pub target: Uuid,
    pub send_db: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStripModel {
    pub uuid: Uuid,
    pub volume_db: f32,
    pub panning: f32,
    pub mute: bool,
}

impl Default for ChannelStripModel {
    fn default() -> Self {
        Self { uuid: Uuid::new_v4(), volume_db: 0.0, panning: 0.0, mute: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AudioUnitKind {
    Instrument(InstrumentModel),
    Bus,
    Output,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioUnitModel {
    pub uuid: Uuid,
    pub name: String,
    pub kind: AudioUnitKind,
    /// Audio unit this unit's channel strip feeds. Unused for the output unit.
    pub output: Option<Uuid>,
    pub midi_effects: Vec<MidiEffectModel>,
    pub audio_effects: Vec<AudioEffectModel>,
    pub aux_sends: Vec<AuxSendModel>,
    pub channel_strip: ChannelStripModel,
    pub tracks: Vec<TrackModel>,
}

impl AudioUnitModel {
    pub fn new(name: &str, kind: AudioUnitKind, output: Option<Uuid>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            kind,
            output,
            midi_effects: Vec::new(),
            audio_effects: Vec::new(),
            aux_sends: Vec::new(),
            channel_strip: ChannelStripModel::default(),
            tracks: Vec::new(),
        }
    }

    pub fn output_unit() -> Self {
        Self::new("Output", AudioUnitKind::Output, None)
    }

    pub fn is_output(&self) -> bool {
        matches!(self.kind, AudioUnitKind::Output)
    }

    pub fn track(&self, uuid: Uuid) -> Option<&TrackModel> {
        self.tracks.iter().find(|track| track.uuid == uuid)
    }
}

/// A sample the project references by identity. Data is fetched on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRef {
    pub uuid: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub timeline: Timeline,
    pub audio_units: Vec<AudioUnitModel>,
    pub automation: Vec<AutomationLane>,
    pub samples: Vec<SampleRef>,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            name: "New Project".to_string(),
            timeline: Timeline { bpm: 120.0, ..Timeline::default() },
            audio_units: vec![AudioUnitModel::output_unit()],
            automation: Vec::new(),
            samples: Vec::new(),
        }
    }
}

/// Where a clip lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipLocation {
    pub unit: Uuid,
    pub track: Uuid,
}

impl Project {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn output_unit(&self) -> Option<&AudioUnitModel> {
        self.audio_units.iter().find(|unit| unit.is_output())
    }

    pub fn audio_unit(&self, uuid: Uuid) -> Option<&AudioUnitModel> {
        self.audio_units.iter().find(|unit| unit.uuid == uuid)
    }

    fn audio_unit_mut(&mut self, uuid: Uuid) -> Result<&mut AudioUnitModel, UpdateError> {
        self.audio_units
            .iter_mut()
            .find(|unit| unit.uuid == uuid)
            .ok_or(UpdateError::UnknownAudioUnit(uuid))
    }

    /// Audio unit owning a track.
    pub fn unit_of_track(&self, track: Uuid) -> Option<&AudioUnitModel> {
        self.audio_units.iter().find(|unit| unit.track(track).is_some())
    }

    pub fn find_track(&self, track: Uuid) -> Option<&TrackModel> {
        self.audio_units.iter().find_map(|unit| unit.track(track))
    }

    pub fn find_clip(&self, clip: Uuid) -> Option<(ClipLocation, &NoteClip)> {
        self.audio_units.iter().find_map(|unit| {
            unit.tracks.iter().find_map(|track| {
                track
                    .clips
                    .iter()
                    .find(|candidate| candidate.uuid == clip)
                    .map(|found| (ClipLocation { unit: unit.uuid, track: track.uuid }, found))
            })
        })
    }

    fn find_track_mut(&mut self, track: Uuid) -> Result<&mut TrackModel, UpdateError> {
        self.audio_units
            .iter_mut()
            .find_map(|unit| unit.tracks.iter_mut().find(|candidate| candidate.uuid == track))
            .ok_or(UpdateError::UnknownTrack(track))
    }

    pub fn lane(&self, target: ParameterAddress) -> Option<&AutomationLane> {
        self.automation.iter().find(|lane| lane.target == target)
    }

    pub fn sample(&self, uuid: Uuid) -> Option<&SampleRef> {
        self.samples.iter().find(|sample| sample.uuid == uuid)
    }

    /// Applies one change notification to this snapshot.
    pub fn apply(&mut self, update: &ProjectUpdate) -> Result<(), UpdateError> {
        match update {
            ProjectUpdate::SetBpm(bpm) => {
                if !(*bpm > 0.0) {
                    return Err(UpdateError::InvalidValue(format!("bpm {bpm}")));
                }
                self.timeline.bpm = *bpm;
            }
            ProjectUpdate::SetSignature(signature) => {
                if signature.nominator == 0 || signature.denominator == 0 {
                    return Err(UpdateError::InvalidValue(format!("signature {signature:?}")));
                }
                self.timeline.signature = *signature;
            }
            ProjectUpdate::SetLoopArea(area) => self.timeline.loop_area = *area,
            ProjectUpdate::SetMarkers(track) => {
                self.timeline.markers = MarkerTrack::new(track.enabled, track.markers.clone());
            }
            ProjectUpdate::SetParameter { address, value } => self.set_parameter(*address, *value)?,
            ProjectUpdate::SetAutomation { target, points } => {
                self.automation.retain(|lane| lane.target != *target);
                if !points.is_empty() {
                    self.automation.push(AutomationLane::new(*target, points.clone()));
                }
            }
            ProjectUpdate::AddAudioUnit(unit) => {
                if self.audio_unit(unit.uuid).is_some() {
                    return Err(UpdateError::DuplicateIdentity(unit.uuid));
                }
                self.audio_units.push(unit.clone());
            }
            ProjectUpdate::RemoveAudioUnit { unit } => {
                let before = self.audio_units.len();
                self.audio_units.retain(|candidate| candidate.uuid != *unit);
                if before == self.audio_units.len() {
                    return Err(UpdateError::UnknownAudioUnit(*unit));
                }
                self.automation.retain(|lane| lane.target.device != *unit);
            }
            ProjectUpdate::SetOutput { unit, output } => self.audio_unit_mut(*unit)?.output = *output,
            ProjectUpdate::AddAudioEffect { unit, index, effect } => {
                let effects = &mut self.audio_unit_mut(*unit)?.audio_effects;
                effects.insert((*index).min(effects.len()), effect.clone());
            }
            ProjectUpdate::RemoveAudioEffect { unit, effect } => {
                let effects = &mut self.audio_unit_mut(*unit)?.audio_effects;
                let index = position_of(effects.iter().map(|e| e.uuid), *effect)?;
                effects.remove(index);
            }
            ProjectUpdate::MoveAudioEffect { unit, effect, index } => {
                let effects = &mut self.audio_unit_mut(*unit)?.audio_effects;
                let from = position_of(effects.iter().map(|e| e.uuid), *effect)?;
                let moved = effects.remove(from);
                effects.insert((*index).min(effects.len()), moved);
            }
            ProjectUpdate::SetAudioEffectEnabled { unit, effect, enabled } => {
                let effects = &mut self.audio_unit_mut(*unit)?.audio_effects;
                let index = position_of(effects.iter().map(|e| e.uuid), *effect)?;
                effects[index].enabled = *enabled;
            }
            ProjectUpdate::AddMidiEffect { unit, index, effect } => {
                let effects = &mut self.audio_unit_mut(*unit)?.midi_effects;
                effects.insert((*index).min(effects.len()), effect.clone());
            }
            ProjectUpdate::RemoveMidiEffect { unit, effect } => {
                let effects = &mut self.audio_unit_mut(*unit)?.midi_effects;
                let index = position_of(effects.iter().map(|e| e.uuid), *effect)?;
                effects.remove(index);
            }
            ProjectUpdate::MoveMidiEffect { unit, effect, index } => {
                let effects = &mut self.audio_unit_mut(*unit)?.midi_effects;
                let from = position_of(effects.iter().map(|e| e.uuid), *effect)?;
                let moved = effects.remove(from);
                effects.insert((*index).min(effects.len()), moved);
            }
            ProjectUpdate::SetMidiEffectEnabled { unit, effect, enabled } => {
                let effects = &mut self.audio_unit_mut(*unit)?.midi_effects;
                let index = position_of(effects.iter().map(|e| e.uuid), *effect)?;
                effects[index].enabled = *enabled;
            }
            ProjectUpdate::AddAuxSend { unit, send } => self.audio_unit_mut(*unit)?.aux_sends.push(send.clone()),
            ProjectUpdate::RemoveAuxSend { unit, send } => {
                let sends = &mut self.audio_unit_mut(*unit)?.aux_sends;
                let index = position_of(sends.iter().map(|s| s.uuid), *send)?;
                sends.remove(index);
            }
            ProjectUpdate::AddTrack { unit, track } => self.audio_unit_mut(*unit)?.tracks.push(track.clone()),
            ProjectUpdate::DeleteTrack { track } => {
                let unit = self
                    .audio_units
                    .iter_mut()
                    .find(|unit| unit.track(*track).is_some())
                    .ok_or(UpdateError::UnknownTrack(*track))?;
                unit.tracks.retain(|candidate| candidate.uuid != *track);
            }
            ProjectUpdate::SetTrackEnabled { track, enabled } => self.find_track_mut(*track)?.enabled = *enabled,
            ProjectUpdate::AddClip { track, clip } => self.find_track_mut(*track)?.clips.push(clip.clone()),
            ProjectUpdate::DeleteClip { clip } => {
                let location = self.find_clip(*clip).map(|(location, _)| location).ok_or(UpdateError::UnknownClip(*clip))?;
                self.find_track_mut(location.track)?.clips.retain(|candidate| candidate.uuid != *clip);
            }
            ProjectUpdate::AddRegion { track, region } => {
                let regions = &mut self.find_track_mut(*track)?.regions;
                let index = regions.partition_point(|candidate| candidate.position <= region.position);
                regions.insert(index, region.clone());
            }
            ProjectUpdate::DeleteRegion { region } => {
                let track = self
                    .audio_units
                    .iter_mut()
                    .flat_map(|unit| unit.tracks.iter_mut())
                    .find(|track| track.regions.iter().any(|candidate| candidate.uuid == *region))
                    .ok_or(UpdateError::UnknownRegion(*region))?;
                track.regions.retain(|candidate| candidate.uuid != *region);
            }
        }
        Ok(())
    }

    fn set_parameter(&mut self, address: ParameterAddress, value: f32) -> Result<(), UpdateError> {
        let index = address.parameter;
        let applied = self.audio_units.iter_mut().any(|unit| {
            if unit.channel_strip.uuid == address.device {
                return unit.channel_strip.set_parameter(index, value);
            }
            if let AudioUnitKind::Instrument(instrument) = &mut unit.kind {
                if instrument.uuid == address.device {
                    return instrument.kind.set_parameter(index, value);
                }
            }
            if let Some(effect) = unit.audio_effects.iter_mut().find(|e| e.uuid == address.device) {
                return effect.kind.set_parameter(index, value);
            }
            if let Some(effect) = unit.midi_effects.iter_mut().find(|e| e.uuid == address.device) {
                return effect.kind.set_parameter(index, value);
            }
            if let Some(send) = unit.aux_sends.iter_mut().find(|s| s.uuid == address.device) {
                if index == 0 {
                    send.send_db = value;
                    return true;
                }
            }
            false
        });
        if applied { Ok(()) } else { Err(UpdateError::UnknownParameter(address)) }
    }
}

impl ChannelStripModel {
    fn set_parameter(&mut self, index: u16, value: f32) -> bool {
        match index {
            0 => self.volume_db = value,
            1 => self.panning = value,
            2 => self.mute = value >= 0.5,
            _ => return false,
        }
        true
    }
}

impl InstrumentKind {
    fn set_parameter(&mut self, index: u16, value: f32) -> bool {
        match (self, index) {
            (InstrumentKind::Synth { volume_db, .. }, 0) => *volume_db = value,
            (InstrumentKind::Synth { attack, .. }, 1) => *attack = value,
            (InstrumentKind::Synth { release, .. }, 2) => *release = value,
            (InstrumentKind::Synth { waveform, .. }, 3) => *waveform = Waveform::from_index(value),
            (InstrumentKind::Sampler { volume_db, .. }, 0) => *volume_db = value,
            _ => return false,
        }
        true
    }
}

impl AudioEffectKind {
    fn set_parameter(&mut self, index: u16, value: f32) -> bool {
        match (self, index) {
            (AudioEffectKind::StereoTool { volume_db, .. }, 0) => *volume_db = value,
            (AudioEffectKind::StereoTool { panning, .. }, 1) => *panning = value,
            (AudioEffectKind::Delay { delay, .. }, 0) => *delay = value.max(0.0) as usize,
            (AudioEffectKind::Delay { feedback, .. }, 1) => *feedback = value,
            (AudioEffectKind::Delay { wet, .. }, 2) => *wet = value,
            _ => return false,
        }
        true
    }
}

impl MidiEffectKind {
    fn set_parameter(&mut self, index: u16, value: f32) -> bool {
        match (self, index) {
            (MidiEffectKind::Pitch { octaves, .. }, 0) => *octaves = value.round() as i32,
            (MidiEffectKind::Pitch { semitones, .. }, 1) => *semitones = value.round() as i32,
            (MidiEffectKind::Pitch { cent, .. }, 2) => *cent = value,
            (MidiEffectKind::Arpeggio { mode, .. }, 0) => *mode = ArpeggioMode::from_index(value),
            (MidiEffectKind::Arpeggio { rate, .. }, 1) => *rate = value.max(0.0) as usize,
            (MidiEffectKind::Arpeggio { gate, .. }, 2) => *gate = value,
            (MidiEffectKind::Arpeggio { repeat, .. }, 3) => *repeat = value.max(1.0) as u32,
            (MidiEffectKind::Arpeggio { octaves, .. }, 4) => *octaves = value.max(1.0) as u32,
            (MidiEffectKind::Arpeggio { velocity, .. }, 5) => *velocity = value,
            _ => return false,
        }
        true
    }
}

fn position_of(mut uuids: impl Iterator<Item = Uuid>, uuid: Uuid) -> Result<usize, UpdateError> {
    uuids.position(|candidate| candidate == uuid).ok_or(UpdateError::UnknownDevice(uuid))
}

/// Change notifications delivered by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectUpdate {
    SetBpm(f64),
    SetSignature(Signature),
    SetLoopArea(LoopArea),
    SetMarkers(MarkerTrack),
    SetParameter { address: ParameterAddress, value: f32 },
    /// Replaces a parameter's automation. Empty `points` removes it.
    SetAutomation { target: ParameterAddress, points: Vec<ValuePoint> },
    AddAudioUnit(AudioUnitModel),
    RemoveAudioUnit { unit: Uuid },
    SetOutput { unit: Uuid, output: Option<Uuid> },
    AddAudioEffect { unit: Uuid, index: usize, effect: AudioEffectModel },
    RemoveAudioEffect { unit: Uuid, effect: Uuid },
    MoveAudioEffect { unit: Uuid, effect: Uuid, index: usize },
    SetAudioEffectEnabled { unit: Uuid, effect: Uuid, enabled: bool },
    AddMidiEffect { unit: Uuid, index: usize, effect: MidiEffectModel },
    RemoveMidiEffect { unit: Uuid, effect: Uuid },
    MoveMidiEffect { unit: Uuid, effect: Uuid, index: usize },
    SetMidiEffectEnabled { unit: Uuid, effect: Uuid, enabled: bool },
    AddAuxSend { unit: Uuid, send: AuxSendModel },
    RemoveAuxSend { unit: Uuid, send: Uuid },
    AddTrack { unit: Uuid, track: TrackModel },
    DeleteTrack { track: Uuid },
    SetTrackEnabled { track: Uuid, enabled: bool },
    AddClip { track: Uuid, clip: NoteClip },
    DeleteClip { clip: Uuid },
    AddRegion { track: Uuid, region: NoteRegion },
    DeleteRegion { region: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth_project() -> (Project, Uuid, Uuid) {
        let mut project = Project::default();
        let output = project.audio_units[0].uuid;
        let mut unit = AudioUnitModel::new(
            "Synth",
            AudioUnitKind::Instrument(InstrumentModel {
                uuid: Uuid::new_v4(),
                kind: InstrumentKind::Synth { waveform: Waveform::Sine, volume_db: -6.0, attack: 0.001, release: 0.1 },
            }),
            Some(output),
        );
        let mut track = TrackModel::new();
        track.clips.push(NoteClip::new(BAR, true, NoteCollection::default()));
        unit.tracks.push(track);
        let uuid = unit.uuid;
        project.audio_units.push(unit);
        (project, output, uuid)
    }

    #[test]
    fn test_bincode_roundtrip() {
        let (project, _, _) = synth_project();
        let bytes = project.to_bytes().unwrap();
        assert_eq!(Project::from_bytes(&bytes).unwrap(), project);
    }

    #[test]
    fn test_find_clip_and_delete() {
        let (mut project, _, unit) = synth_project();
        let clip = project.audio_unit(unit).unwrap().tracks[0].clips[0].uuid;
        let (location, _) = project.find_clip(clip).unwrap();
        assert_eq!(location.unit, unit);

        project.apply(&ProjectUpdate::DeleteClip { clip }).unwrap();
        assert!(project.find_clip(clip).is_none());
        assert_eq!(project.apply(&ProjectUpdate::DeleteClip { clip }), Err(UpdateError::UnknownClip(clip)));
    }

    #[test]
    fn test_effect_reorder() {
        let (mut project, _, unit) = synth_project();
        let a = AudioEffectModel { uuid: Uuid::new_v4(), enabled: true, kind: AudioEffectKind::StereoTool { volume_db: 0.0, panning: 0.0 } };
        let b = AudioEffectModel { uuid: Uuid::new_v4(), enabled: true, kind: AudioEffectKind::Delay { delay: 4, feedback: 0.5, wet: 0.3 } };
        project.apply(&ProjectUpdate::AddAudioEffect { unit, index: 0, effect: a.clone() }).unwrap();
        project.apply(&ProjectUpdate::AddAudioEffect { unit, index: 9, effect: b.clone() }).unwrap();
        project.apply(&ProjectUpdate::MoveAudioEffect { unit, effect: b.uuid, index: 0 }).unwrap();
        let order: Vec<_> = project.audio_unit(unit).unwrap().audio_effects.iter().map(|e| e.uuid).collect();
        assert_eq!(order, vec![b.uuid, a.uuid]);

        project.apply(&ProjectUpdate::SetParameter { address: ParameterAddress::new(b.uuid, 1), value: 0.25 }).unwrap();
        assert!(matches!(
            project.audio_unit(unit).unwrap().audio_effects[0].kind,
            AudioEffectKind::Delay { feedback, .. } if feedback == 0.25
        ));
    }

    #[test]
    fn test_invalid_updates() {
        let (mut project, _, _) = synth_project();
        assert!(project.apply(&ProjectUpdate::SetBpm(0.0)).is_err());
        let address = ParameterAddress::new(Uuid::new_v4(), 0);
        assert_eq!(
            project.apply(&ProjectUpdate::SetParameter { address, value: 1.0 }),
            Err(UpdateError::UnknownParameter(address))
        );
    }

    #[test]
    fn test_marker_lookup() {
        let track = MarkerTrack::new(true, vec![Marker::new(BAR * 2.0, 1), Marker::new(0.0, 2)]);
        assert_eq!(track.markers[0].position, 0.0);
        assert_eq!(track.floor_index(-1.0), None);
        assert_eq!(track.floor_index(0.0), Some(0));
        assert_eq!(track.floor_index(BAR * 3.0), Some(1));
    }

    #[test]
    fn test_loop_cycles() {
        let mut region = NoteRegion::new(BAR, BAR * 2.0, NoteCollection::default());
        region.loop_duration = 960.0;
        region.loop_offset = 480.0;
        let cycles: Vec<_> = region.loop_cycles(0.0, BAR + 1000.0).collect();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].raw_start, BAR - 480.0);
        assert_eq!(cycles[0].result_start, BAR);
        assert_eq!(cycles[0].result_end, BAR + 480.0);
        assert_eq!(cycles[1].result_start, BAR + 480.0);
        assert_eq!(cycles[1].result_end, BAR + 1000.0);
        assert_eq!(region.loop_cycles(0.0, BAR).count(), 0);
    }

    #[test]
    fn test_collection_range() {
        let collection = NoteCollection::new(vec![
            NoteEventModel::new(960.0, 100.0, 60, 1.0),
            NoteEventModel::new(0.0, 100.0, 62, 1.0),
            NoteEventModel::new(480.0, 2000.0, 64, 1.0),
        ]);
        let pitches: Vec<_> = collection.range(0.0, 960.0).iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![62, 64]);
        assert_eq!(collection.max_duration(), 2000.0);
    }
}
