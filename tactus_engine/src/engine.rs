//! The render pipeline and its controller-side handle.
//!
//! [`Engine`] lives on the audio thread. Each call to [`Engine::process`]
//! applies pending commands, lays pending wiring, segments the quantum,
//! runs every unit in graph order and publishes the transport snapshot.
//! Nothing in that path blocks.

use crate::audio_unit::{AudioUnit, UnitHost};
use crate::block::ProcessInfo;
use crate::buffers::{AudioArena, EventArena};
use crate::clip_sequencer::{ClipSequencer, ScheduledClip};
use crate::commands::{EngineCommand, EngineNotification, Notifier};
use crate::config::{EngineConfig, ExportConfiguration};
use crate::error::{EngineError, Result};
use crate::events::NoteIds;
use crate::graph::{ProcessorGraph, ProcessorKey};
use crate::metronome::Metronome;
use crate::processor::ProcessContext;
use crate::renderer::{BlockRenderer, CallbackId};
use crate::samples::{SampleData, SampleStore};
use crate::telemetry::{self, Telemetry, TelemetryReceiver, TelemetryRecord};
use crate::time_info::TimeInfo;
use crate::units::Unit;
use crate::update_clock::UpdateClock;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info, warn};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use tactus_shared::ppqn::{self, Ppqn, QUARTER};
use tactus_shared::project::AudioUnitKind;
use tactus_shared::{EngineState, ExchangeRegion, Project, ProjectUpdate, SyncReader, SyncWriter, RENDER_QUANTUM};
use uuid::Uuid;

const GARBAGE_CAPACITY: usize = 256;

pub struct Engine {
    config: EngineConfig,
    running: bool,
    panic: bool,
    project: Project,
    time_info: TimeInfo,
    renderer: BlockRenderer,
    info: ProcessInfo,
    graph: ProcessorGraph<Unit>,
    order: Vec<ProcessorKey>,
    clock: ProcessorKey,
    units: Vec<AudioUnit>,
    buses: HashMap<Uuid, ProcessorKey>,
    audio: AudioArena,
    events: EventArena,
    clips: ClipSequencer,
    note_ids: NoteIds,
    samples: SampleStore,
    telemetry: Telemetry,
    notifier: Notifier,
    commands: Receiver<EngineCommand>,
    garbage: Sender<Unit>,
    metronome: Metronome,
    state: SyncWriter<EngineState>,
    export: Option<ExportConfiguration>,
    playback_timestamp: Ppqn,
    recording_start: Ppqn,
    count_in: Option<CallbackId>,
    metronome_preference: bool,
}

/// Builds an engine for `project` and the handle that controls it.
///
/// `region` must be large enough for an [`EngineState`]. With an export
/// configuration the engine renders one stereo stem per listed unit
/// instead of the primary output.
pub fn create(
    config: EngineConfig,
    project: Project,
    region: ExchangeRegion,
    export: Option<ExportConfiguration>,
) -> Result<(Engine, EngineHandle)> {
    config.validate()?;
    let state = SyncWriter::new(region.clone())?;
    let reader = SyncReader::new(region)?;
    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    let (notification_tx, notification_rx) = crossbeam_channel::bounded(config.notification_capacity);
    let (garbage_tx, garbage_rx) = crossbeam_channel::bounded(GARBAGE_CAPACITY);
    let (telemetry, telemetry_rx) = telemetry::channel(config.telemetry_capacity);
    let samples = SampleStore::new();

    let mut graph = ProcessorGraph::new();
    let clock = graph.register_processor(Unit::UpdateClock(UpdateClock::new(config.update_rate)));
    let mut audio = AudioArena::new();
    let mut events = EventArena::new();
    let units = {
        let mut host = UnitHost {
            graph: &mut graph,
            audio: &mut audio,
            events: &mut events,
            clock,
            sample_rate: config.sample_rate,
            garbage: &garbage_tx,
        };
        validate_routing(&project, export.as_ref())?;
        project
            .audio_units
            .iter()
            .map(|model| {
                let options = export.as_ref().map(|export| export.options_for(model.uuid)).unwrap_or_default();
                AudioUnit::new(model, options, &mut host)
            })
            .collect::<Result<Vec<_>>>()?
    };

    let notifier = Notifier::new(notification_tx);
    info!(
        "engine created: {} audio units, {} processors at {} Hz",
        units.len(),
        graph.len(),
        config.sample_rate
    );
    notifier.send(EngineNotification::Ready);

    let engine = Engine {
        renderer: BlockRenderer::new(config.sample_rate),
        config,
        running: true,
        panic: false,
        project,
        time_info: TimeInfo::default(),
        info: ProcessInfo::new(),
        order: Vec::new(),
        graph,
        clock,
        units,
        buses: HashMap::new(),
        audio,
        events,
        clips: ClipSequencer::new(),
        note_ids: NoteIds::default(),
        samples: samples.clone(),
        telemetry,
        notifier,
        commands: command_rx,
        garbage: garbage_tx,
        metronome: Metronome::new(),
        state,
        export,
        playback_timestamp: 0.0,
        recording_start: 0.0,
        count_in: None,
        metronome_preference: false,
    };
    let handle = EngineHandle {
        commands: command_tx,
        notifications: notification_rx,
        state: reader,
        telemetry: telemetry_rx,
        garbage: garbage_rx,
        samples,
    };
    Ok((engine, handle))
}

/// Like [`create`], for a project snapshot serialized by the controller.
pub fn create_from_bytes(
    config: EngineConfig,
    project: &[u8],
    region: ExchangeRegion,
    export: Option<ExportConfiguration>,
) -> Result<(Engine, EngineHandle)> {
    let project = Project::from_bytes(project)?;
    create(config, project, region, export)
}

/// Every unit needs a bus to feed and every stem a unit to read.
fn validate_routing(project: &Project, export: Option<&ExportConfiguration>) -> Result<()> {
    if project.output_unit().is_none() {
        return Err(EngineError::MissingAdapter { uuid: Uuid::nil(), what: "output unit" });
    }
    let is_bus = |uuid: Uuid| {
        project
            .audio_unit(uuid)
            .is_some_and(|unit| matches!(unit.kind, AudioUnitKind::Bus | AudioUnitKind::Output))
    };
    for unit in project.audio_units.iter().filter(|unit| !unit.is_output()) {
        if let Some(output) = unit.output {
            if !is_bus(output) {
                return Err(EngineError::MissingAdapter { uuid: unit.uuid, what: "output bus" });
            }
        }
    }
    for stem in export.map(|export| export.stems.as_slice()).unwrap_or_default() {
        if project.audio_unit(stem.unit).is_none() {
            return Err(EngineError::MissingAdapter { uuid: stem.unit, what: "stem unit" });
        }
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Engine {
    pub fn sample_rate(&self) -> f32 {
        self.config.sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn time_info(&self) -> &TimeInfo {
        &self.time_info
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Output channels `process` expects.
    pub fn output_channels(&self) -> usize {
        match &self.export {
            Some(export) => export.channel_count(),
            None => 2,
        }
    }

    /// Renders one quantum into `outputs`, one slice of [`RENDER_QUANTUM`]
    /// samples per channel. Returns false once the pipeline has stopped.
    pub fn process(&mut self, outputs: &mut [&mut [f32]]) -> bool {
        if !self.running {
            return false;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| self.render(outputs))) {
            Ok(Ok(())) => self.running,
            Ok(Err(err)) => {
                self.terminate(err.to_string());
                false
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                self.terminate(reason);
                false
            }
        }
    }

    fn terminate(&mut self, reason: String) {
        error!("audio pipeline terminated: {reason}");
        self.running = false;
        self.notifier.send(EngineNotification::Log(reason.clone()));
        self.notifier.send(EngineNotification::Terminated(reason));
    }

    fn render(&mut self, outputs: &mut [&mut [f32]]) -> Result<()> {
        self.apply_commands()?;
        if !self.running {
            return Ok(());
        }
        if self.panic {
            return Err(EngineError::Panic);
        }
        let channels = self.output_channels();
        if outputs.len() < channels || outputs.iter().any(|channel| channel.len() < RENDER_QUANTUM) {
            return Err(EngineError::InvalidConfig(format!(
                "expected {channels} output channels of {RENDER_QUANTUM} samples"
            )));
        }
        let metronome_enabled = self.time_info.metronome_enabled;

        self.wire_units()?;
        if !self.graph.is_valid() {
            self.graph.sort()?;
            self.order.clear();
            self.order.extend_from_slice(self.graph.order());
        }

        let marker_changed = self.renderer.process(&mut self.time_info, &self.project.timeline, &mut self.info);
        let samples = self.samples.load();
        {
            let mut ctx = ProcessContext {
                sample_rate: self.config.sample_rate,
                time_info: &self.time_info,
                project: &self.project,
                audio: &mut self.audio,
                events: &mut self.events,
                clips: &mut self.clips,
                samples: &samples,
                telemetry: &mut self.telemetry,
                notifier: &self.notifier,
                note_ids: &mut self.note_ids,
            };
            for key in &self.order {
                if let Some(unit) = self.graph.get_mut(*key) {
                    unit.process(&mut ctx, &self.info);
                }
            }
        }
        self.metronome.process(&self.info, metronome_enabled, self.config.sample_rate);
        self.write_outputs(outputs, metronome_enabled);

        self.graph.processors_mut().for_each(Unit::on_after_process);
        if let Some(changes) = self.clips.changes() {
            self.notifier.send(EngineNotification::ClipSequenceChanges(changes));
        }
        if marker_changed {
            self.notifier.send(EngineNotification::MarkerState(self.renderer.marker_state()));
        }
        self.publish_state();
        Ok(())
    }

    fn write_outputs(&mut self, outputs: &mut [&mut [f32]], metronome_enabled: bool) {
        match &self.export {
            None => {
                let primary = self.units.iter().find(|unit| unit.is_output()).map(AudioUnit::output);
                let click = self.metronome.output();
                let [left, right, ..] = outputs else {
                    return;
                };
                match primary {
                    Some(buffer) => {
                        let buffer = self.audio.get(buffer);
                        left[..RENDER_QUANTUM].copy_from_slice(buffer.left());
                        right[..RENDER_QUANTUM].copy_from_slice(buffer.right());
                    }
                    None => {
                        left[..RENDER_QUANTUM].fill(0.0);
                        right[..RENDER_QUANTUM].fill(0.0);
                    }
                }
                if metronome_enabled {
                    for (sample, value) in left.iter_mut().zip(click.left()) {
                        *sample += value;
                    }
                    for (sample, value) in right.iter_mut().zip(click.right()) {
                        *sample += value;
                    }
                }
                let peak = |channel: &[f32]| channel[..RENDER_QUANTUM].iter().fold(0.0f32, |max, s| max.max(s.abs()));
                self.telemetry.push(TelemetryRecord::MasterPeaks([peak(left), peak(right)]));
            }
            Some(export) => {
                for (index, stem) in export.stems.iter().enumerate() {
                    let buffer = self.units.iter().find(|unit| unit.uuid() == stem.unit).map(AudioUnit::output);
                    let (left, right) = (index * 2, index * 2 + 1);
                    match buffer {
                        Some(buffer) => {
                            let buffer = self.audio.get(buffer);
                            outputs[left][..RENDER_QUANTUM].copy_from_slice(buffer.left());
                            outputs[right][..RENDER_QUANTUM].copy_from_slice(buffer.right());
                        }
                        None => {
                            outputs[left][..RENDER_QUANTUM].fill(0.0);
                            outputs[right][..RENDER_QUANTUM].fill(0.0);
                        }
                    }
                }
            }
        }
    }

    fn publish_state(&mut self) {
        let time_info = &self.time_info;
        let remaining = if time_info.is_counting_in {
            (self.recording_start - time_info.position()) / QUARTER
        } else {
            0.0
        };
        let total = self.config.count_in_beats as i32;
        let timestamp = self.playback_timestamp;
        self.state.try_write(|state| {
            state.position = time_info.position();
            state.playback_timestamp = timestamp;
            state.count_in_beats_total = total;
            state.count_in_beats_remaining = remaining;
            state.is_playing = time_info.transporting;
            state.is_recording = time_info.is_recording;
            state.is_counting_in = time_info.is_counting_in;
        });
    }

    /// Lays the wiring of every unit that asked for it.
    fn wire_units(&mut self) -> Result<()> {
        if !self.units.iter().any(AudioUnit::needs_wiring) {
            return Ok(());
        }
        self.buses.clear();
        self.buses.extend(self.units.iter().filter_map(|unit| unit.bus().map(|bus| (unit.uuid(), bus))));
        for unit in self.units.iter_mut().filter(|unit| unit.needs_wiring()) {
            let output = self.project.audio_unit(unit.uuid()).and_then(|model| model.output);
            if !unit.wire(&mut self.graph, &self.buses, output)? {
                warn!("audio unit {} has no output bus", unit.uuid());
            }
        }
        Ok(())
    }

    fn apply_commands(&mut self) -> Result<()> {
        while let Ok(command) = self.commands.try_recv() {
            self.apply(command)?;
            if !self.running {
                break;
            }
        }
        Ok(())
    }

    fn apply(&mut self, command: EngineCommand) -> Result<()> {
        match command {
            EngineCommand::Play => {
                info!("play from {}", self.playback_timestamp);
                self.time_info.set_position(self.playback_timestamp);
                self.time_info.transporting = true;
            }
            EngineCommand::Stop { reset } => {
                info!("stop (reset: {reset})");
                if self.time_info.is_recording || self.time_info.is_counting_in {
                    self.cancel_recording();
                    self.time_info.set_position(self.playback_timestamp);
                }
                let was_transporting = self.time_info.transporting;
                self.time_info.transporting = false;
                self.time_info.metronome_enabled = self.metronome_preference;
                if reset || !was_transporting {
                    self.reset();
                }
            }
            EngineCommand::SetPosition(position) => {
                if !self.time_info.is_recording {
                    self.playback_timestamp = position;
                    self.time_info.set_position(position);
                }
            }
            EngineCommand::StartRecording { count_in } => self.start_recording(count_in),
            EngineCommand::StopRecording => {
                if self.time_info.is_recording || self.time_info.is_counting_in {
                    info!("stop recording");
                    self.cancel_recording();
                    self.time_info.metronome_enabled = self.metronome_preference;
                    self.time_info.transporting = false;
                }
            }
            EngineCommand::SetMetronomeEnabled(enabled) => {
                self.metronome_preference = enabled;
                self.time_info.metronome_enabled = enabled;
            }
            EngineCommand::Panic => self.panic = true,
            EngineCommand::NoteOn { unit, pitch, velocity } => {
                let pushed = self.units.iter().find(|candidate| candidate.uuid() == unit).is_some_and(|audio_unit| {
                    audio_unit.push_note_on(&mut self.graph, pitch, velocity)
                });
                if !pushed {
                    warn!("note on for unknown instrument unit {unit}");
                }
            }
            EngineCommand::NoteOff { unit, pitch } => {
                let pushed = self
                    .units
                    .iter()
                    .find(|candidate| candidate.uuid() == unit)
                    .is_some_and(|audio_unit| audio_unit.push_note_off(&mut self.graph, pitch));
                if !pushed {
                    warn!("note off for unknown instrument unit {unit}");
                }
            }
            EngineCommand::ScheduleClipPlay(clips) => {
                for clip in clips {
                    match self.project.find_clip(clip) {
                        Some((location, model)) => self.clips.schedule_play(location.track, ScheduledClip::from(model)),
                        None => self.notifier.warn(format!("could not schedule clip play, cannot find clip {clip}")),
                    }
                }
            }
            EngineCommand::ScheduleClipStop(tracks) => {
                for track in tracks {
                    if self.project.find_track(track).is_some() {
                        self.clips.schedule_stop(track);
                    } else {
                        self.notifier.warn(format!("could not schedule clip stop, cannot find track {track}"));
                    }
                }
            }
            EngineCommand::Update(update) => self.update(update)?,
            EngineCommand::QueryLoadingComplete(responder) => {
                let pool = self.samples.load();
                let complete = self.project.samples.iter().all(|sample| pool.contains(sample.uuid));
                let _ = responder.try_send(complete);
            }
            EngineCommand::Terminate => {
                info!("terminate requested");
                self.running = false;
                self.notifier.send(EngineNotification::Terminated("terminated by controller".to_string()));
            }
        }
        Ok(())
    }

    fn start_recording(&mut self, count_in: bool) {
        if self.time_info.is_recording || self.time_info.is_counting_in {
            return;
        }
        if !self.time_info.transporting && count_in {
            let signature = self.project.timeline.signature;
            let start = ppqn::quantize_floor(
                self.time_info.position(),
                ppqn::from_signature(signature.nominator, signature.denominator),
            );
            info!("count-in of {} beats before {start}", self.config.count_in_beats);
            self.recording_start = start;
            self.time_info.is_counting_in = true;
            self.time_info.metronome_enabled = true;
            self.time_info.transporting = true;
            self.time_info
                .set_position(start - ppqn::from_signature(self.config.count_in_beats, signature.denominator));
            let preference = self.metronome_preference;
            self.count_in = Some(self.renderer.set_callback(
                start,
                Box::new(move |time_info: &mut TimeInfo| {
                    time_info.is_counting_in = false;
                    time_info.is_recording = true;
                    time_info.metronome_enabled = preference;
                }),
            ));
        } else {
            info!("start recording at {}", self.time_info.position());
            self.recording_start = self.time_info.position();
            self.time_info.transporting = true;
            self.time_info.is_recording = true;
        }
    }

    fn cancel_recording(&mut self) {
        self.time_info.is_recording = false;
        self.time_info.is_counting_in = false;
        if let Some(id) = self.count_in.take() {
            self.renderer.cancel_callback(id);
        }
    }

    fn reset(&mut self) {
        debug!("reset");
        self.playback_timestamp = 0.0;
        self.cancel_recording();
        self.time_info.metronome_enabled = self.metronome_preference;
        self.time_info.set_position(0.0);
        self.time_info.transporting = false;
        self.renderer.reset();
        self.clips.reset();
        self.graph.processors_mut().for_each(Unit::reset);
        self.metronome.reset();
        self.telemetry.push(TelemetryRecord::MasterPeaks([0.0; 2]));
    }

    /// Applies a change notification to the snapshot, then mirrors it in
    /// the graph. Updates the snapshot rejects are dropped with a warning.
    fn update(&mut self, update: ProjectUpdate) -> Result<()> {
        let removed_tracks: Vec<Uuid> = match &update {
            ProjectUpdate::RemoveAudioUnit { unit } => self
                .project
                .audio_unit(*unit)
                .map(|model| model.tracks.iter().map(|track| track.uuid).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        };
        if let Err(err) = self.project.apply(&update) {
            self.notifier.warn(format!("rejected project update: {err}"));
            return Ok(());
        }
        let Self { project, units, graph, audio, events, clock, garbage, config, renderer, clips, export, .. } = self;
        let mut host = UnitHost {
            graph,
            audio,
            events,
            clock: *clock,
            sample_rate: config.sample_rate,
            garbage,
        };
        match update {
            ProjectUpdate::SetBpm(_) => renderer.on_tempo_changed(),
            ProjectUpdate::SetMarkers(_) => renderer.on_markers_changed(),
            ProjectUpdate::SetSignature(_) | ProjectUpdate::SetLoopArea(_) | ProjectUpdate::SetAutomation { .. } => {}
            ProjectUpdate::SetParameter { address, value } => {
                let applied = units
                    .iter()
                    .any(|unit| unit.set_parameter(host.graph, address.device, address.parameter, value));
                if !applied {
                    debug!("no processor bound to {address:?}");
                }
            }
            ProjectUpdate::AddAudioUnit(model) => {
                let options = export.as_ref().map(|export| export.options_for(model.uuid)).unwrap_or_default();
                let unit = AudioUnit::new(&model, options, &mut host)?;
                if !matches!(model.kind, AudioUnitKind::Instrument(_)) {
                    // units routed to this bus before it existed
                    units.iter_mut().for_each(|unit| unit.invalidate_wiring(host.graph));
                }
                info!("added audio unit {} ({})", model.name, model.uuid);
                units.push(unit);
            }
            ProjectUpdate::RemoveAudioUnit { unit } => {
                // edges into the removed bus vanish with it, so no unit may keep stale edge handles
                units.iter_mut().for_each(|unit| unit.invalidate_wiring(host.graph));
                if let Some(index) = units.iter().position(|candidate| candidate.uuid() == unit) {
                    units.remove(index).terminate(&mut host);
                }
                for track in removed_tracks {
                    clips.on_track_deleted(track);
                }
                info!("removed audio unit {unit}");
            }
            ProjectUpdate::SetOutput { unit, .. } => {
                if let Some(unit) = units.iter_mut().find(|candidate| candidate.uuid() == unit) {
                    unit.invalidate_wiring(host.graph);
                }
            }
            ProjectUpdate::AddAudioEffect { unit, .. }
            | ProjectUpdate::RemoveAudioEffect { unit, .. }
            | ProjectUpdate::MoveAudioEffect { unit, .. }
            | ProjectUpdate::SetAudioEffectEnabled { unit, .. } => {
                if let (Some(audio_unit), Some(model)) =
                    (units.iter_mut().find(|candidate| candidate.uuid() == unit), project.audio_unit(unit))
                {
                    audio_unit.sync_audio_effects(&model.audio_effects, &mut host)?;
                }
            }
            ProjectUpdate::AddMidiEffect { unit, .. }
            | ProjectUpdate::RemoveMidiEffect { unit, .. }
            | ProjectUpdate::MoveMidiEffect { unit, .. }
            | ProjectUpdate::SetMidiEffectEnabled { unit, .. } => {
                if let (Some(audio_unit), Some(model)) =
                    (units.iter_mut().find(|candidate| candidate.uuid() == unit), project.audio_unit(unit))
                {
                    audio_unit.sync_midi_effects(&model.midi_effects, host.graph);
                }
            }
            ProjectUpdate::AddAuxSend { unit, .. } | ProjectUpdate::RemoveAuxSend { unit, .. } => {
                if let (Some(audio_unit), Some(model)) =
                    (units.iter_mut().find(|candidate| candidate.uuid() == unit), project.audio_unit(unit))
                {
                    audio_unit.sync_sends(&model.aux_sends, &mut host)?;
                }
            }
            ProjectUpdate::DeleteTrack { track } => clips.on_track_deleted(track),
            ProjectUpdate::DeleteClip { clip } => clips.on_clip_deleted(clip),
            ProjectUpdate::AddTrack { .. }
            | ProjectUpdate::SetTrackEnabled { .. }
            | ProjectUpdate::AddClip { .. }
            | ProjectUpdate::AddRegion { .. }
            | ProjectUpdate::DeleteRegion { .. } => {}
        }
        Ok(())
    }
}

/// Controller-side end of an [`Engine`].
pub struct EngineHandle {
    commands: Sender<EngineCommand>,
    notifications: Receiver<EngineNotification>,
    state: SyncReader<EngineState>,
    telemetry: TelemetryReceiver,
    garbage: Receiver<Unit>,
    samples: SampleStore,
}

impl EngineHandle {
    /// Returns false once the engine is gone.
    pub fn send(&self, command: EngineCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn play(&self) -> bool {
        self.send(EngineCommand::Play)
    }

    pub fn stop(&self, reset: bool) -> bool {
        self.send(EngineCommand::Stop { reset })
    }

    pub fn set_position(&self, position: Ppqn) -> bool {
        self.send(EngineCommand::SetPosition(position))
    }

    pub fn start_recording(&self, count_in: bool) -> bool {
        self.send(EngineCommand::StartRecording { count_in })
    }

    pub fn stop_recording(&self) -> bool {
        self.send(EngineCommand::StopRecording)
    }

    pub fn set_metronome_enabled(&self, enabled: bool) -> bool {
        self.send(EngineCommand::SetMetronomeEnabled(enabled))
    }

    pub fn panic(&self) -> bool {
        self.send(EngineCommand::Panic)
    }

    pub fn note_on(&self, unit: Uuid, pitch: u8, velocity: f32) -> bool {
        self.send(EngineCommand::NoteOn { unit, pitch, velocity })
    }

    pub fn note_off(&self, unit: Uuid, pitch: u8) -> bool {
        self.send(EngineCommand::NoteOff { unit, pitch })
    }

    pub fn schedule_clip_play(&self, clips: Vec<Uuid>) -> bool {
        self.send(EngineCommand::ScheduleClipPlay(clips))
    }

    pub fn schedule_clip_stop(&self, tracks: Vec<Uuid>) -> bool {
        self.send(EngineCommand::ScheduleClipStop(tracks))
    }

    pub fn update(&self, update: ProjectUpdate) -> bool {
        self.send(EngineCommand::Update(update))
    }

    /// The answer arrives on the returned channel after the next callback.
    pub fn query_loading_complete(&self) -> Receiver<bool> {
        let (responder, answer) = crossbeam_channel::bounded(1);
        self.send(EngineCommand::QueryLoadingComplete(responder));
        answer
    }

    pub fn terminate(&self) -> bool {
        self.send(EngineCommand::Terminate)
    }

    /// Latest unread transport snapshot.
    pub fn poll_state(&mut self) -> Option<EngineState> {
        let mut latest = None;
        self.state.try_read(|state| latest = Some(state.clone()));
        latest
    }

    pub fn notifications(&self) -> impl Iterator<Item = EngineNotification> + '_ {
        self.notifications.try_iter()
    }

    pub fn telemetry(&mut self) -> &mut TelemetryReceiver {
        &mut self.telemetry
    }

    /// Publishes loaded sample data to the audio thread.
    pub fn provide_sample(&self, uuid: Uuid, data: SampleData) {
        self.samples.insert(uuid, data);
    }

    pub fn samples(&self) -> &SampleStore {
        &self.samples
    }

    /// Frees units the engine removed. Returns how many were dropped.
    pub fn collect_garbage(&self) -> usize {
        self.garbage.try_iter().count()
    }
}
