//! Error types for the stream session library.

use std::fmt;

use crate::codec::{AudioCodec, SenderKind, VideoCodec};
use crate::session::SessionState;

/// Errors returned synchronously to the caller of a session command.
///
/// Network-side failures (connection refused, authentication rejected,
/// retry budget exhausted) never appear here. They are delivered as
/// [`SessionEvent`](crate::SessionEvent)s, because the sender reports them
/// asynchronously after `connect` has already returned.
///
/// - **Prepare**: [`Configuration`](Self::Configuration),
///   [`Capability`](Self::Capability), [`NotPrepared`](Self::NotPrepared).
/// - **State machine**: [`InvalidState`](Self::InvalidState).
/// - **Recording**: [`Recording`](Self::Recording).
/// - **Controller**: [`Closed`](Self::Closed).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The selected codec is not in the sender family's accepted set.
    #[error("{sender} sender does not accept {codec}")]
    Configuration { sender: SenderKind, codec: CodecName },

    /// The prepare collaborator could not satisfy the requested format.
    #[error("device cannot prepare {0}")]
    Capability(MediaKind),

    /// A start command arrived before any successful prepare.
    #[error("pipeline not prepared; call prepare first")]
    NotPrepared,

    /// The command is not legal in the current state. State is unchanged.
    #[error("cannot {command} while {state}")]
    InvalidState {
        command: &'static str,
        state: SessionState,
    },

    /// The destination string could not be used by the sender.
    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    /// The recorder failed to open or finalize its output.
    #[error("recording error: {0}")]
    Recording(#[source] std::io::Error),

    /// The controller task has shut down.
    #[error("session closed")]
    Closed,
}

/// Which half of the pipeline a prepare failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// A codec of either kind, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecName {
    Audio(AudioCodec),
    Video(VideoCodec),
}

impl fmt::Display for CodecName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio(codec) => write!(f, "audio codec {codec}"),
            Self::Video(codec) => write!(f, "video codec {codec}"),
        }
    }
}

/// Typed outcome of the prepare step.
///
/// Kept separate from [`SessionError`] so callers and tests can tell a
/// configuration mistake from a device limitation without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PrepareError {
    #[error("{sender} sender does not accept {codec}")]
    Configuration { sender: SenderKind, codec: CodecName },
    #[error("device cannot prepare {0}")]
    Capability(MediaKind),
}

impl From<PrepareError> for SessionError {
    fn from(err: PrepareError) -> Self {
        match err {
            PrepareError::Configuration { sender, codec } => {
                SessionError::Configuration { sender, codec }
            }
            PrepareError::Capability(kind) => SessionError::Capability(kind),
        }
    }
}

/// Convenience alias for `Result<T, SessionError>`.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_errors_keep_their_kind() {
        let err = SessionError::from(PrepareError::Capability(MediaKind::Video));
        assert!(matches!(err, SessionError::Capability(MediaKind::Video)));
        assert_eq!(err.to_string(), "device cannot prepare video");

        let err = SessionError::from(PrepareError::Configuration {
            sender: SenderKind::Srt,
            codec: CodecName::Video(VideoCodec::Av1),
        });
        assert_eq!(err.to_string(), "SRT sender does not accept video codec AV1");
    }
}
