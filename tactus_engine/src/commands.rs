use crate::clip_sequencer::ClipSequenceChanges;
use crate::renderer::MarkerState;
use crossbeam_channel::{Sender, TrySendError};
use tactus_shared::{Ppqn, ProjectUpdate};
use uuid::Uuid;

/// Requests from the controller, applied at the top of the next callback.
#[derive(Debug)]
pub enum EngineCommand {
    Play,
    /// Stops the transport. A second stop, or `reset`, rewinds to zero.
    Stop { reset: bool },
    SetPosition(Ppqn),
    StartRecording { count_in: bool },
    StopRecording,
    SetMetronomeEnabled(bool),
    /// Refuse to render from the next callback on.
    Panic,
    NoteOn { unit: Uuid, pitch: u8, velocity: f32 },
    NoteOff { unit: Uuid, pitch: u8 },
    /// Clip identities to launch on their tracks.
    ScheduleClipPlay(Vec<Uuid>),
    /// Track identities whose clip should stop.
    ScheduleClipStop(Vec<Uuid>),
    Update(ProjectUpdate),
    /// Answers whether every referenced sample is available.
    QueryLoadingComplete(Sender<bool>),
    Terminate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotification {
    Ready,
    Log(String),
    ClipSequenceChanges(ClipSequenceChanges),
    MarkerState(Option<MarkerState>),
    /// The audio thread needs this sample's data.
    FetchSample(Uuid),
    /// The pipeline stopped for good. Carries the reason.
    Terminated(String),
}

/// Audio-thread side of the notification channel. Never blocks: if the
/// controller stops draining, notifications are dropped.
#[derive(Clone)]
pub struct Notifier {
    sender: Sender<EngineNotification>,
}

impl Notifier {
    pub fn new(sender: Sender<EngineNotification>) -> Self {
        Self { sender }
    }

    pub fn send(&self, notification: EngineNotification) -> bool {
        match self.sender.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn warn(&self, message: String) {
        log::warn!("{message}");
        self.send(EngineNotification::Log(message));
    }
}
