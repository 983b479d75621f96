// Transport - Metronome session state

/// Transport state of the metronome
///
/// `CountingIn` covers exactly the four count-in beats; the switch to
/// `Running` is applied when the first pattern beat is heard, not when it is
/// scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    CountingIn,
    Running,
}

impl TransportState {
    /// Check if a session is active (counting in or running)
    pub fn is_active(&self) -> bool {
        !matches!(self, TransportState::Stopped)
    }

    pub fn is_counting_in(&self) -> bool {
        matches!(self, TransportState::CountingIn)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TransportState::Running)
    }
}
