//! Stream sessions.
//!
//! A [`StreamSession`] coordinates one capture pipeline, one protocol sender
//! and at most one local recording. Streaming and recording are independent
//! consumers of the same encoded media: either can start or stop while the
//! other keeps running, and the pipeline runs as long as at least one of
//! them does.
//!
//! The handle is cheap to clone. All clones talk to the same controller
//! task; when the last clone is dropped the controller finalizes any
//! recording, disconnects and exits.

mod controller;
mod recording;
mod state;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::{AudioConfig, SessionConfig, VideoConfig};
use crate::error::{Result, SessionError};
use crate::event::{EventSink, SessionEvent};
use crate::pipeline::{MediaInput, MediaPipeline};
use crate::retry::RetryPolicy;
use crate::sender::ProtocolSender;
use crate::stats::{Counters, FrameStats};
use crate::variant::SessionVariant;

use controller::{Channels, Command, Controller, Snapshot};

pub(crate) use controller::Inbound;
pub use recording::{ElementaryStreamRecorder, RecordSink, RecordWriter, RecordingSummary};
pub use state::SessionState;

const COMMAND_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct StreamSession {
    commands: mpsc::Sender<Command>,
    input: MediaInput,
    events: broadcast::Sender<SessionEvent>,
    snapshot: Arc<RwLock<Snapshot>>,
    counters: Arc<Counters>,
}

impl StreamSession {
    /// Spawn the controller for `variant`, recording to Annex B files.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        variant: SessionVariant,
        pipeline: impl MediaPipeline + 'static,
        config: SessionConfig,
    ) -> Self {
        Self::spawn_with_recorder(variant, pipeline, ElementaryStreamRecorder::new(), config)
    }

    /// Must be called from within a Tokio runtime.
    pub fn spawn_with_recorder(
        mut variant: SessionVariant,
        pipeline: impl MediaPipeline + 'static,
        recorder: impl RecordSink + 'static,
        config: SessionConfig,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (media_tx, media_rx) = mpsc::channel(config.media_queue_capacity.max(1));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let snapshot = Arc::new(RwLock::new(Snapshot::default()));
        let input = MediaInput::new(media_tx, inbound_tx.clone(), Arc::clone(&counters));

        let sink_tx = inbound_tx.clone();
        variant.sender().attach(EventSink::new(move |event| {
            let _ = sink_tx.send(Inbound::Connection(event));
        }));

        tracing::info!(
            source = %variant.source(),
            sender = %variant.kind(),
            max_retries = config.max_retries,
            "session created"
        );

        let controller = Controller::new(
            variant,
            Box::new(pipeline),
            Box::new(recorder),
            RetryPolicy::new(config.max_retries, config.retry_delay),
            config.auth,
            Channels {
                input: input.clone(),
                inbound: inbound_tx,
                events: events.clone(),
                snapshot: Arc::clone(&snapshot),
                counters: Arc::clone(&counters),
            },
        );
        tokio::spawn(controller.run(command_rx, inbound_rx, media_rx));

        Self {
            commands: command_tx,
            input,
            events,
            snapshot,
            counters,
        }
    }

    /// Screen capture session.
    pub fn display(
        sender: impl ProtocolSender + 'static,
        pipeline: impl MediaPipeline + 'static,
        config: SessionConfig,
    ) -> Self {
        Self::spawn(SessionVariant::display(sender), pipeline, config)
    }

    /// Session replaying an encoded file.
    pub fn file_replay(
        sender: impl ProtocolSender + 'static,
        pipeline: impl MediaPipeline + 'static,
        config: SessionConfig,
    ) -> Self {
        Self::spawn(SessionVariant::file_replay(sender), pipeline, config)
    }

    /// Camera capture session.
    pub fn camera(
        sender: impl ProtocolSender + 'static,
        pipeline: impl MediaPipeline + 'static,
        config: SessionConfig,
    ) -> Self {
        Self::spawn(SessionVariant::camera(sender), pipeline, config)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }

    /// The preview surface exists. Moves `Idle` to `PreviewOnly`.
    pub async fn surface_ready(&self) -> Result<()> {
        self.request(Command::SurfaceReady).await
    }

    /// The preview surface is gone: finalize the recording, disconnect,
    /// stop the pipeline. Ends in `Idle`; a new `prepare` is required.
    ///
    /// Teardown always completes. An error only reports a recording that
    /// could not be finalized cleanly.
    pub async fn surface_destroyed(&self) -> Result<()> {
        self.request(Command::SurfaceDestroyed).await?
    }

    /// Validate the codec pair against the sender family, then prepare
    /// audio and video in that order.
    pub async fn prepare(&self, audio: AudioConfig, video: VideoConfig) -> Result<()> {
        self.request(|reply| Command::Prepare {
            audio,
            video,
            reply,
        })
        .await?
    }

    /// Begin streaming to `destination`.
    ///
    /// Returns once the connection attempt has started; the outcome arrives
    /// as [`SessionEvent`]s.
    pub async fn start_stream(&self, destination: impl Into<String>) -> Result<()> {
        let destination = destination.into();
        self.request(|reply| Command::StartStream { destination, reply })
            .await?
    }

    /// Stop streaming. Cancels any pending retry. A no-op when not
    /// streaming.
    pub async fn stop_stream(&self) -> Result<()> {
        self.request(Command::StopStream).await?
    }

    /// Start recording to `target`. Returns the recording id.
    pub async fn start_record(&self, target: impl AsRef<Path>) -> Result<String> {
        let target = target.as_ref().to_path_buf();
        self.request(|reply| Command::StartRecord { target, reply })
            .await?
    }

    /// Finalize the current recording. `Ok(None)` when not recording.
    pub async fn stop_record(&self) -> Result<Option<RecordingSummary>> {
        self.request(Command::StopRecord).await?
    }

    /// Set how many reconnection attempts follow a connection failure.
    pub async fn set_retries(&self, max_attempts: u32) -> Result<()> {
        self.request(|reply| Command::SetRetries(max_attempts, reply))
            .await
    }

    /// Schedule a reconnection by hand, optionally switching to a backup
    /// destination for this and every later attempt.
    ///
    /// Consumes one attempt from the retry budget. Returns `false` if the
    /// budget is spent, the reason is not retryable, or nothing is being
    /// streamed.
    pub async fn retry(
        &self,
        delay: Duration,
        reason: impl Into<String>,
        backup: Option<String>,
    ) -> Result<bool> {
        let reason = reason.into();
        self.request(|reply| Command::Retry {
            delay,
            reason,
            backup,
            reply,
        })
        .await
    }

    pub fn state(&self) -> SessionState {
        self.snapshot.read().state
    }

    /// True while connecting, connected or reconnecting.
    pub fn is_streaming(&self) -> bool {
        self.snapshot.read().streaming
    }

    pub fn is_recording(&self) -> bool {
        self.snapshot.read().recording
    }

    /// The destination currently streamed to, after any backup switch.
    pub fn destination(&self) -> Option<String> {
        self.snapshot.read().destination.clone()
    }

    /// Reconnection attempts used since the last successful connection.
    pub fn retry_attempts(&self) -> u32 {
        self.snapshot.read().retry_attempts
    }

    /// What the sender announces for the live stream, e.g. the SDP an RTP
    /// receiver needs. `None` while not streaming or when the family has
    /// nothing to announce.
    pub fn description(&self) -> Option<String> {
        self.snapshot.read().description.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The producer handle pipelines push into. Also handed to the
    /// pipeline on start.
    pub fn media_input(&self) -> MediaInput {
        self.input.clone()
    }

    pub fn stats(&self) -> FrameStats {
        self.counters.snapshot()
    }

    pub fn reset_stats(&self) {
        self.counters.reset();
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
