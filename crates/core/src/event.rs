//! Connection events and the session's outbound notifications.
//!
//! A [`ProtocolSender`](crate::ProtocolSender) reports everything that
//! happens on the network through an [`EventSink`]; it never returns
//! errors from `connect` or `send_*`. The session is the only consumer that
//! acts on these events. Observers receive the same events, read-only, as
//! [`SessionEvent::Connection`] on the session's broadcast channel.
//!
//! ## Ordering
//!
//! For one connection attempt at most one of
//! [`Success`](ConnectionEvent::Success) / [`Failed`](ConnectionEvent::Failed)
//! is emitted before any later [`Disconnected`](ConnectionEvent::Disconnected).
//! [`NewBitrate`](ConnectionEvent::NewBitrate) is only emitted while
//! connected.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::session::{RecordingSummary, SessionState};

/// Events raised by a protocol sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection attempt to `destination` has begun.
    Started { destination: String },
    Success,
    Failed { reason: String },
    Disconnected,
    AuthError,
    AuthSuccess,
    /// Measured outgoing bitrate in bits per second.
    NewBitrate(u64),
}

impl ConnectionEvent {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Why a stream reached the terminal `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Every permitted reconnection attempt failed.
    RetryExhausted { reason: String, attempts: u32 },
    /// The failure reason is one the retry policy never retries.
    NotRetryable { reason: String },
    /// The server rejected our credentials.
    Authentication,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryExhausted { reason, attempts } => {
                write!(f, "retry exhausted after {attempts} attempts: {reason}")
            }
            Self::NotRetryable { reason } => write!(f, "not retryable: {reason}"),
            Self::Authentication => write!(f, "authentication failed"),
        }
    }
}

/// Notifications published by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A sender event, forwarded unchanged.
    Connection(ConnectionEvent),
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    RetryScheduled {
        attempt: u32,
        delay: Duration,
        destination: String,
    },
    /// The stream is down for good; the sender has been disconnected.
    Failed(Failure),
    RecordingStarted {
        id: String,
        target: PathBuf,
    },
    RecordingFinalized(RecordingSummary),
}

/// Where a sender reports its [`ConnectionEvent`]s.
///
/// Cheap to clone; may be called from any thread or task. Emitting never
/// blocks and never runs session logic inline, so a sender may emit while
/// inside one of its own methods.
#[derive(Clone)]
pub struct EventSink {
    deliver: Arc<dyn Fn(ConnectionEvent) + Send + Sync>,
}

impl EventSink {
    pub fn new(deliver: impl Fn(ConnectionEvent) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// A sink backed by an unbounded channel, for driving a sender directly.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self::new(move |event| {
            let _ = tx.send(event);
        });
        (sink, rx)
    }

    /// A sink that discards everything.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn emit(&self, event: ConnectionEvent) {
        tracing::trace!(?event, "connection event");
        (self.deliver)(event);
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}
