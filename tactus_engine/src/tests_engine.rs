use crate::commands::EngineNotification;
use crate::config::{AudioUnitOptions, EngineConfig, ExportConfiguration, StemExport};
use crate::engine::{create, create_from_bytes, Engine, EngineHandle};
use crate::error::EngineError;
use crate::export::render_offline;
use crate::samples::SampleData;
use crate::telemetry::TelemetryRecord;
use tactus_shared::ppqn::{BAR, QUARTER};
use tactus_shared::project::{
    AudioUnitKind, AudioUnitModel, InstrumentKind, InstrumentModel, NoteClip, NoteCollection, NoteEventModel,
    NoteRegion, SampleRef, TrackModel, Waveform,
};
use tactus_shared::{EngineState, ExchangeRegion, Project, ProjectUpdate, RENDER_QUANTUM};
use uuid::Uuid;

/// 187.5 bpm at 48 kHz: one pulse is 16 samples, one quantum 8 pulses.
fn base_project() -> Project {
    let mut project = Project::default();
    project.timeline.bpm = 187.5;
    project
}

fn synth_unit(output: Uuid, notes: Vec<NoteEventModel>) -> AudioUnitModel {
    let instrument = InstrumentModel {
        uuid: Uuid::new_v4(),
        kind: InstrumentKind::Synth { waveform: Waveform::Square, volume_db: 0.0, attack: 0.001, release: 0.001 },
    };
    let mut unit = AudioUnitModel::new("Lead", AudioUnitKind::Instrument(instrument), Some(output));
    let mut track = TrackModel::new();
    if !notes.is_empty() {
        track.regions.push(NoteRegion::new(0.0, BAR, NoteCollection::new(notes)));
    }
    unit.tracks.push(track);
    unit
}

fn synth_project() -> (Project, Uuid) {
    let mut project = base_project();
    let output = project.audio_units[0].uuid;
    let unit = synth_unit(output, vec![NoteEventModel::new(0.0, QUARTER, 60, 1.0)]);
    let uuid = unit.uuid;
    project.audio_units.push(unit);
    (project, uuid)
}

fn start(project: Project) -> (Engine, EngineHandle) {
    let region = ExchangeRegion::heap(EngineState::region_size());
    create(EngineConfig::default(), project, region, None).unwrap()
}

/// Renders `quanta` callbacks and returns the left channel.
fn render(engine: &mut Engine, quanta: usize) -> Vec<f32> {
    let rendered = render_offline(engine, (quanta * RENDER_QUANTUM) as f64 / 48000.0).unwrap();
    rendered.channels[0].clone()
}

fn is_silent(samples: &[f32]) -> bool {
    samples.iter().all(|sample| *sample == 0.0)
}

#[test]
fn test_region_note_plays_after_play() {
    let (project, synth) = synth_project();
    let (mut engine, mut handle) = start(project);
    assert_eq!(handle.notifications().next(), Some(EngineNotification::Ready));
    assert!(is_silent(&render(&mut engine, 4)));

    handle.play();
    let left = render(&mut engine, 4);
    assert!(left[..RENDER_QUANTUM].iter().any(|sample| *sample != 0.0));
    let noted = handle.telemetry().drain().any(|record| record == TelemetryRecord::NoteOn { unit: synth, pitch: 60 });
    assert!(noted);
    assert!(engine.time_info().transporting);
    assert_eq!(engine.time_info().position(), 32.0);

    // the quarter note ends at sample 15360, the release is 48 samples long
    handle.set_position(QUARTER * 2.0);
    let left = render(&mut engine, 4);
    assert!(is_silent(&left[RENDER_QUANTUM..]));
}

#[test]
fn test_stop_twice_resets() {
    let (project, _) = synth_project();
    let (mut engine, handle) = start(project);
    handle.set_position(100.0);
    handle.play();
    render(&mut engine, 2);
    assert_eq!(engine.time_info().position(), 116.0);

    handle.stop(false);
    render(&mut engine, 1);
    assert!(!engine.time_info().transporting);
    assert_eq!(engine.time_info().position(), 116.0);

    handle.stop(false);
    render(&mut engine, 1);
    assert_eq!(engine.time_info().position(), 0.0);
    handle.play();
    render(&mut engine, 1);
    assert_eq!(engine.time_info().position(), 8.0);
}

#[test]
fn test_count_in_starts_recording_on_the_bar() {
    let (project, _) = synth_project();
    let config = EngineConfig { count_in_beats: 1, ..EngineConfig::default() };
    let region = ExchangeRegion::heap(EngineState::region_size());
    let (mut engine, mut handle) = create(config, project, region, None).unwrap();
    handle.set_position(BAR + 100.0);
    handle.start_recording(true);
    render(&mut engine, 1);

    let state = handle.poll_state().unwrap();
    assert!(state.is_counting_in);
    assert!(state.is_playing);
    assert!(!state.is_recording);
    assert_eq!(state.count_in_beats_total, 1);
    assert_eq!(state.position, BAR - QUARTER + 8.0);
    assert!((state.count_in_beats_remaining - 952.0 / 960.0).abs() < 1e-9);
    assert!(engine.time_info().metronome_enabled);

    // one quarter is 120 quanta
    let mut latest = state;
    for _ in 0..120 {
        render(&mut engine, 1);
        if let Some(state) = handle.poll_state() {
            latest = state;
        }
    }
    assert!(latest.is_recording);
    assert!(!latest.is_counting_in);
    assert_eq!(latest.count_in_beats_remaining, 0.0);
    assert!(!engine.time_info().metronome_enabled);

    // recording pins the position
    handle.set_position(0.0);
    handle.stop_recording();
    render(&mut engine, 1);
    assert!(!engine.time_info().transporting);
    assert!(!engine.time_info().is_recording);
    assert!(engine.time_info().position() > BAR);
}

#[test]
fn test_stop_recording_cancels_count_in() {
    let (project, _) = synth_project();
    let (mut engine, handle) = start(project);
    handle.start_recording(true);
    render(&mut engine, 1);
    assert!(engine.time_info().is_counting_in);
    handle.stop_recording();
    handle.set_position(-100.0);
    handle.play();
    // crosses the bar line the count-in was waiting for
    render(&mut engine, 20);
    assert!(engine.time_info().position() > 0.0);
    assert!(!engine.time_info().is_recording);
}

#[test]
fn test_panic_terminates_pipeline() {
    let (project, _) = synth_project();
    let (mut engine, handle) = start(project);
    handle.panic();
    let mut outputs = [[0.0f32; RENDER_QUANTUM]; 2];
    let [left, right] = &mut outputs;
    assert!(!engine.process(&mut [left.as_mut_slice(), right.as_mut_slice()]));
    assert!(!engine.is_running());
    let notifications: Vec<_> = handle.notifications().collect();
    assert!(notifications.contains(&EngineNotification::Terminated("Manual Panic".to_string())));
    assert!(!engine.process(&mut [left.as_mut_slice(), right.as_mut_slice()]));
}

#[test]
fn test_terminate_command() {
    let (project, _) = synth_project();
    let (mut engine, handle) = start(project);
    handle.terminate();
    assert!(render_offline(&mut engine, 0.01).is_err());
    assert!(!engine.is_running());
}

#[test]
fn test_routing_cycle_is_fatal() {
    let mut project = base_project();
    let output = project.audio_units[0].uuid;
    let mut a = AudioUnitModel::new("A", AudioUnitKind::Bus, Some(output));
    let b = AudioUnitModel::new("B", AudioUnitKind::Bus, Some(a.uuid));
    a.output = Some(b.uuid);
    project.audio_units.extend([a, b]);
    let (mut engine, handle) = start(project);

    assert!(render_offline(&mut engine, 0.01).is_err());
    let terminated = handle.notifications().any(|notification| {
        matches!(notification, EngineNotification::Terminated(reason) if reason.contains("cycle"))
    });
    assert!(terminated);
}

#[test]
fn test_missing_output_bus_fails_construction() {
    let mut project = base_project();
    project.audio_units.push(synth_unit(Uuid::new_v4(), Vec::new()));
    let region = ExchangeRegion::heap(EngineState::region_size());
    let result = create(EngineConfig::default(), project, region, None);
    assert!(matches!(result, Err(EngineError::MissingAdapter { what: "output bus", .. })));

    let region = ExchangeRegion::heap(4);
    let result = create(EngineConfig::default(), base_project(), region, None);
    assert!(matches!(result, Err(EngineError::Exchange(_))));
}

#[test]
fn test_create_from_serialized_project() {
    let (project, synth) = synth_project();
    let bytes = project.to_bytes().unwrap();
    let region = ExchangeRegion::heap(EngineState::region_size());
    let (engine, _handle) = create_from_bytes(EngineConfig::default(), &bytes, region, None).unwrap();
    assert!(engine.project().audio_unit(synth).is_some());

    let region = ExchangeRegion::heap(EngineState::region_size());
    let result = create_from_bytes(EngineConfig::default(), &bytes[..3], region, None);
    assert!(matches!(result, Err(EngineError::Project(_))));
}

#[test]
fn test_stems_render_into_channel_pairs() {
    let (project, synth) = synth_project();
    let output = project.audio_units[0].uuid;
    let export = ExportConfiguration {
        stems: vec![
            StemExport { unit: synth, options: AudioUnitOptions::default() },
            StemExport { unit: output, options: AudioUnitOptions::default() },
        ],
    };
    let region = ExchangeRegion::heap(EngineState::region_size());
    let (mut engine, handle) = create(EngineConfig::default(), project, region, Some(export)).unwrap();
    assert_eq!(engine.output_channels(), 4);
    handle.play();
    let rendered = render_offline(&mut engine, 0.01).unwrap();
    assert_eq!(rendered.channels.len(), 4);
    // the output unit only sums the synth at unity gain
    assert!(rendered.channels[0].iter().any(|sample| *sample != 0.0));
    assert_eq!(rendered.channels[0], rendered.channels[2]);
    assert_eq!(rendered.stems().len(), 2);
}

#[test]
fn test_live_notes_sound_while_stopped() {
    let mut project = base_project();
    let output = project.audio_units[0].uuid;
    let unit = synth_unit(output, Vec::new());
    let uuid = unit.uuid;
    project.audio_units.push(unit);
    let (mut engine, handle) = start(project);

    handle.note_on(uuid, 64, 1.0);
    assert!(!is_silent(&render(&mut engine, 2)));

    handle.note_off(uuid, 64);
    let left = render(&mut engine, 4);
    assert!(is_silent(&left[RENDER_QUANTUM..]));

    handle.note_on(Uuid::new_v4(), 64, 1.0);
    render(&mut engine, 1);
    assert!(engine.is_running());
}

#[test]
fn test_removing_a_unit_silences_it() {
    let (project, synth) = synth_project();
    let (mut engine, handle) = start(project);
    handle.play();
    assert!(!is_silent(&render(&mut engine, 1)));

    handle.update(ProjectUpdate::RemoveAudioUnit { unit: synth });
    assert!(is_silent(&render(&mut engine, 1)));
    // note chain, instrument, channel strip
    assert_eq!(handle.collect_garbage(), 3);
    assert!(engine.project().audio_unit(synth).is_none());

    handle.update(ProjectUpdate::RemoveAudioUnit { unit: synth });
    render(&mut engine, 1);
    assert!(handle.notifications().any(|notification| matches!(notification, EngineNotification::Log(_))));
    assert!(engine.is_running());
}

#[test]
fn test_added_unit_is_wired_on_next_callback() {
    let project = base_project();
    let output = project.audio_units[0].uuid;
    let (mut engine, handle) = start(project);
    handle.play();
    assert!(is_silent(&render(&mut engine, 1)));

    let unit = synth_unit(output, Vec::new());
    let uuid = unit.uuid;
    handle.update(ProjectUpdate::AddAudioUnit(unit));
    handle.note_on(uuid, 60, 1.0);
    assert!(!is_silent(&render(&mut engine, 1)));
}

#[test]
fn test_clip_launch_notifies_changes() {
    let (mut project, synth) = synth_project();
    let clip = NoteClip::new(BAR, true, NoteCollection::new(vec![NoteEventModel::new(0.0, QUARTER, 67, 1.0)]));
    let clip_id = clip.uuid;
    let track = project.audio_units[1].tracks[0].uuid;
    project.audio_units[1].tracks[0].clips.push(clip);
    let (mut engine, handle) = start(project);
    handle.notifications().for_each(drop);

    handle.schedule_clip_play(vec![clip_id, Uuid::new_v4()]);
    handle.play();
    // nothing plays yet, so the launch lands on the bar line at zero
    render(&mut engine, 2);
    let notifications: Vec<_> = handle.notifications().collect();
    assert!(notifications.iter().any(|notification| matches!(notification, EngineNotification::Log(_))));
    let started = notifications.iter().any(|notification| {
        matches!(notification, EngineNotification::ClipSequenceChanges(changes) if changes.started == vec![clip_id])
    });
    assert!(started);

    handle.update(ProjectUpdate::DeleteTrack { track });
    render(&mut engine, 1);
    assert!(engine.project().audio_unit(synth).is_some_and(|unit| unit.tracks.is_empty()));
}

#[test]
fn test_loading_complete_follows_sample_store() {
    let mut project = base_project();
    let sample = Uuid::new_v4();
    project.samples.push(SampleRef { uuid: sample, name: "kick".to_string() });
    let (mut engine, handle) = start(project);

    let answer = handle.query_loading_complete();
    render(&mut engine, 1);
    assert_eq!(answer.try_recv(), Ok(false));

    handle.provide_sample(sample, SampleData::new(48000, vec![vec![0.5; 16]]));
    let answer = handle.query_loading_complete();
    render(&mut engine, 1);
    assert_eq!(answer.try_recv(), Ok(true));
}

#[test]
fn test_tempo_update_changes_pulse_rate() {
    let (project, _) = synth_project();
    let (mut engine, handle) = start(project);
    handle.play();
    render(&mut engine, 1);
    handle.update(ProjectUpdate::SetBpm(375.0));
    render(&mut engine, 1);
    assert_eq!(engine.time_info().position(), 24.0);

    handle.update(ProjectUpdate::SetBpm(-1.0));
    render(&mut engine, 1);
    assert_eq!(engine.project().timeline.bpm, 375.0);
}
