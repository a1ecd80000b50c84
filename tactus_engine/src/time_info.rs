use tactus_shared::Ppqn;

/// Transport state owned by the audio thread.
///
/// Replaces a global transport: the engine owns one instance and lends it to
/// the renderer and to processors for the duration of a callback.
#[derive(Debug, Clone, Default)]
pub struct TimeInfo {
    position: Ppqn,
    leap: bool,
    pub transporting: bool,
    pub is_recording: bool,
    pub is_counting_in: bool,
    pub metronome_enabled: bool,
}

impl TimeInfo {
    pub fn position(&self) -> Ppqn {
        self.position
    }

    /// Jumps to `position`. The next render callback starts discontinuous.
    pub fn set_position(&mut self, position: Ppqn) {
        if self.position != position {
            self.position = position;
            self.leap = true;
        }
    }

    /// Moves forward without flagging a leap.
    pub fn advance_to(&mut self, position: Ppqn) {
        self.position = position;
    }

    /// Returns whether the position was set since the last call.
    pub fn take_leap(&mut self) -> bool {
        std::mem::take(&mut self.leap)
    }
}
