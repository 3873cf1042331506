use std::fmt;

/// Observable state of a [`StreamSession`](super::StreamSession).
///
/// ```text
/// Idle --surface_ready--> PreviewOnly
/// PreviewOnly --start_stream--> Streaming
/// PreviewOnly --start_record--> Recording
/// Streaming <--start/stop_record--> StreamingAndRecording
/// Streaming --connection failed, budget left--> Reconnecting
/// Reconnecting --connection ok--> Streaming
/// Reconnecting --budget exhausted--> Failed
/// any --surface_destroyed--> Idle
/// ```
///
/// `Reconnecting` and `Failed` describe the stream half only; a recording
/// may still be running underneath them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    PreviewOnly,
    Streaming,
    Recording,
    StreamingAndRecording,
    Reconnecting,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::PreviewOnly => "preview only",
            Self::Streaming => "streaming",
            Self::Recording => "recording",
            Self::StreamingAndRecording => "streaming and recording",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where the network half of the session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamPhase {
    Off,
    /// Connecting or connected.
    Live,
    /// Waiting for a scheduled retry, or for its outcome.
    Reconnecting,
    /// Gave up; the sender has been disconnected.
    Failed,
}

impl StreamPhase {
    pub(crate) fn is_active(self) -> bool {
        matches!(self, Self::Live | Self::Reconnecting)
    }
}

pub(crate) fn derive_state(surface_ready: bool, phase: StreamPhase, recording: bool) -> SessionState {
    match (phase, recording) {
        (StreamPhase::Failed, _) => SessionState::Failed,
        (StreamPhase::Reconnecting, _) => SessionState::Reconnecting,
        (StreamPhase::Live, true) => SessionState::StreamingAndRecording,
        (StreamPhase::Live, false) => SessionState::Streaming,
        (StreamPhase::Off, true) => SessionState::Recording,
        (StreamPhase::Off, false) if surface_ready => SessionState::PreviewOnly,
        (StreamPhase::Off, false) => SessionState::Idle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_states() {
        assert_eq!(derive_state(false, StreamPhase::Off, false), SessionState::Idle);
        assert_eq!(derive_state(true, StreamPhase::Off, false), SessionState::PreviewOnly);
        assert_eq!(derive_state(true, StreamPhase::Live, false), SessionState::Streaming);
        assert_eq!(derive_state(false, StreamPhase::Off, true), SessionState::Recording);
        assert_eq!(
            derive_state(true, StreamPhase::Live, true),
            SessionState::StreamingAndRecording
        );
        assert_eq!(
            derive_state(true, StreamPhase::Reconnecting, true),
            SessionState::Reconnecting
        );
        assert_eq!(derive_state(true, StreamPhase::Failed, false), SessionState::Failed);
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(SessionState::StreamingAndRecording.to_string(), "streaming and recording");
    }
}
