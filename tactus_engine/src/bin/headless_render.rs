use anyhow::{anyhow, bail};
use log::{info, warn};
use std::path::PathBuf;
use tactus_engine::export::{render_offline, write_stems, write_wav, ExportConfig};
use tactus_engine::{EngineConfig, EngineNotification, ExportConfiguration, StemExport};
use tactus_shared::ppqn::{BAR, QUARTER};
use tactus_shared::project::{
    AudioEffectKind, AudioEffectModel, AudioUnitKind, AudioUnitModel, AuxSendModel, InstrumentKind,
    InstrumentModel, NoteCollection, NoteEventModel, NoteRegion, TrackModel, Waveform,
};
use tactus_shared::{EngineState, ExchangeRegion, Project};
use uuid::Uuid;

/// Two bars of a synth arpeggio sent into a delay bus.
fn demo_project() -> Project {
    let mut project = Project::default();
    project.name = "Headless Demo".to_string();
    let output = project.audio_units[0].uuid;

    let mut echo = AudioUnitModel::new("Echo", AudioUnitKind::Bus, Some(output));
    echo.audio_effects.push(AudioEffectModel {
        uuid: Uuid::new_v4(),
        enabled: true,
        kind: AudioEffectKind::Delay { delay: 4, feedback: 0.4, wet: 1.0 },
    });

    let instrument = InstrumentModel {
        uuid: Uuid::new_v4(),
        kind: InstrumentKind::Synth { waveform: Waveform::Saw, volume_db: -12.0, attack: 0.005, release: 0.2 },
    };
    let mut lead = AudioUnitModel::new("Lead", AudioUnitKind::Instrument(instrument), Some(output));
    lead.aux_sends.push(AuxSendModel { uuid: Uuid::new_v4(), target: echo.uuid, send_db: -6.0 });
    let notes = [60u8, 64, 67, 72, 67, 64, 60, 55]
        .iter()
        .enumerate()
        .map(|(index, pitch)| NoteEventModel::new(index as f64 * QUARTER, QUARTER * 0.5, *pitch, 0.8))
        .collect();
    let mut track = TrackModel::new();
    track.regions.push(NoteRegion::new(0.0, BAR * 2.0, NoteCollection::new(notes)));
    lead.tracks.push(track);

    project.audio_units.extend([lead, echo]);
    project
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut stems = false;
    let mut target = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--stems" => stems = true,
            other if other.starts_with("--") => bail!("unknown option {other}"),
            other => target = Some(PathBuf::from(other)),
        }
    }
    let target = target.ok_or_else(|| anyhow!("usage: headless_render [--stems] <output>"))?;

    let project = demo_project();
    let export = stems.then(|| ExportConfiguration {
        stems: project
            .audio_units
            .iter()
            .filter(|unit| !unit.is_output())
            .map(|unit| StemExport { unit: unit.uuid, options: Default::default() })
            .collect(),
    });
    let names: Vec<String> = match &export {
        Some(export) => export
            .stems
            .iter()
            .filter_map(|stem| project.audio_unit(stem.unit).map(|unit| unit.name.clone()))
            .collect(),
        None => Vec::new(),
    };

    let config = EngineConfig::default();
    let export_config = ExportConfig { sample_rate: config.sample_rate as u32, ..ExportConfig::default() };
    let region = ExchangeRegion::heap(EngineState::region_size());
    let (mut engine, handle) = tactus_engine::create(config, project, region, export)?;
    handle.play();

    // two bars at 120 bpm plus the tail
    let rendered = render_offline(&mut engine, 4.0 + export_config.tail_seconds)?;
    for notification in handle.notifications() {
        match notification {
            EngineNotification::Log(message) => warn!("engine: {message}"),
            other => info!("engine: {other:?}"),
        }
    }
    info!("collected {} retired units", handle.collect_garbage());

    if stems {
        let paths = write_stems(&target, &names, &rendered.stems(), &export_config)?;
        info!("wrote {} stems into {}", paths.len(), target.display());
    } else {
        write_wav(&target, &rendered.stereo(0), &export_config)?;
        info!("wrote {} frames to {}", rendered.frames(), target.display());
    }
    Ok(())
}
