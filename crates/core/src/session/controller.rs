//! The task that owns a session.
//!
//! Everything mutable (the sender, the pipeline, the recording, the retry
//! policy) lives in [`Controller`] and is touched only from its task.
//! Commands, sender events, retry timers and media all arrive as messages,
//! so a sender emitting an event from inside `connect` or `send_video`
//! simply queues it; nothing re-enters the controller.
//!
//! Priority is internal messages first, then commands, then media. Parameter
//! sets therefore overtake media units that were queued before them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::{AudioConfig, Credentials, PreparedMedia, VideoConfig};
use crate::error::{MediaKind, PrepareError, Result, SessionError};
use crate::event::{ConnectionEvent, Failure, SessionEvent};
use crate::media::ParameterSets;
use crate::pipeline::{MediaFrame, MediaInput, MediaPipeline};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::stats::Counters;
use crate::variant::SessionVariant;

use super::recording::{RecordSink, RecordingHandle, RecordingSummary};
use super::state::{SessionState, StreamPhase, derive_state};

/// Messages produced inside the crate: sender callbacks, timers and the
/// pipeline's parameter sets.
#[derive(Debug)]
pub(crate) enum Inbound {
    Connection(ConnectionEvent),
    RetryDue { epoch: u64 },
    ParameterSets(ParameterSets),
}

pub(crate) enum Command {
    SurfaceReady(oneshot::Sender<()>),
    SurfaceDestroyed(oneshot::Sender<Result<()>>),
    Prepare {
        audio: AudioConfig,
        video: VideoConfig,
        reply: oneshot::Sender<Result<()>>,
    },
    StartStream {
        destination: String,
        reply: oneshot::Sender<Result<()>>,
    },
    StopStream(oneshot::Sender<Result<()>>),
    StartRecord {
        target: PathBuf,
        reply: oneshot::Sender<Result<String>>,
    },
    StopRecord(oneshot::Sender<Result<Option<RecordingSummary>>>),
    SetRetries(u32, oneshot::Sender<()>),
    Retry {
        delay: Duration,
        reason: String,
        backup: Option<String>,
        reply: oneshot::Sender<bool>,
    },
}

/// What the synchronous getters read.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub(crate) state: SessionState,
    pub(crate) streaming: bool,
    pub(crate) recording: bool,
    pub(crate) destination: Option<String>,
    pub(crate) retry_attempts: u32,
    pub(crate) description: Option<String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            streaming: false,
            recording: false,
            destination: None,
            retry_attempts: 0,
            description: None,
        }
    }
}

pub(crate) struct Controller {
    variant: SessionVariant,
    pipeline: Box<dyn MediaPipeline>,
    recorder: Box<dyn RecordSink>,
    auth: Option<Credentials>,
    input: MediaInput,
    inbound: mpsc::UnboundedSender<Inbound>,
    events: broadcast::Sender<SessionEvent>,
    snapshot: Arc<RwLock<Snapshot>>,
    counters: Arc<Counters>,

    state: SessionState,
    surface_ready: bool,
    phase: StreamPhase,
    destination: Option<String>,
    retry: RetryPolicy,
    /// Bumped whenever pending retries must be forgotten.
    epoch: u64,
    retry_timer: Option<JoinHandle<()>>,
    prepared: Option<PreparedMedia>,
    pipeline_running: bool,
    parameter_sets: Option<ParameterSets>,
    recording: Option<RecordingHandle>,
}

pub(crate) struct Channels {
    pub(crate) input: MediaInput,
    pub(crate) inbound: mpsc::UnboundedSender<Inbound>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
    pub(crate) snapshot: Arc<RwLock<Snapshot>>,
    pub(crate) counters: Arc<Counters>,
}

impl Controller {
    pub(crate) fn new(
        variant: SessionVariant,
        pipeline: Box<dyn MediaPipeline>,
        recorder: Box<dyn RecordSink>,
        retry: RetryPolicy,
        auth: Option<Credentials>,
        channels: Channels,
    ) -> Self {
        Self {
            variant,
            pipeline,
            recorder,
            auth,
            input: channels.input,
            inbound: channels.inbound,
            events: channels.events,
            snapshot: channels.snapshot,
            counters: channels.counters,
            state: SessionState::Idle,
            surface_ready: false,
            phase: StreamPhase::Off,
            destination: None,
            retry,
            epoch: 0,
            retry_timer: None,
            prepared: None,
            pipeline_running: false,
            parameter_sets: None,
            recording: None,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut inbound: mpsc::UnboundedReceiver<Inbound>,
        mut media: mpsc::Receiver<MediaFrame>,
    ) {
        tracing::debug!(source = %self.variant.source(), sender = %self.variant.kind(), "session controller started");
        loop {
            tokio::select! {
                biased;
                Some(message) = inbound.recv() => self.handle_inbound(message),
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(frame) = media.recv() => self.handle_media(frame),
            }
        }

        if let Err(err) = self.teardown() {
            tracing::warn!(error = %err, "teardown on shutdown failed");
        }
        self.publish();
        tracing::debug!("session controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::SurfaceReady(reply) => {
                self.surface_ready = true;
                self.reply(reply, ());
            }
            Command::SurfaceDestroyed(reply) => {
                let result = self.teardown();
                self.reply(reply, result);
            }
            Command::Prepare {
                audio,
                video,
                reply,
            } => {
                let result = self.prepare(audio, video);
                self.reply(reply, result);
            }
            Command::StartStream { destination, reply } => {
                let result = self.start_stream(destination);
                self.reply(reply, result);
            }
            Command::StopStream(reply) => {
                let result = self.stop_stream();
                self.reply(reply, result);
            }
            Command::StartRecord { target, reply } => {
                let result = self.start_record(target);
                self.reply(reply, result);
            }
            Command::StopRecord(reply) => {
                let result = self.stop_record();
                self.reply(reply, result);
            }
            Command::SetRetries(max, reply) => {
                self.retry.set_max_attempts(max);
                self.reply(reply, ());
            }
            Command::Retry {
                delay,
                reason,
                backup,
                reply,
            } => {
                let scheduled = self.manual_retry(delay, reason, backup);
                self.reply(reply, scheduled);
            }
        }
    }

    /// Publish the new state before the caller sees the result.
    fn reply<T>(&mut self, reply: oneshot::Sender<T>, value: T) {
        self.publish();
        let _ = reply.send(value);
    }

    fn handle_inbound(&mut self, message: Inbound) {
        match message {
            Inbound::Connection(event) => self.on_connection_event(event),
            Inbound::RetryDue { epoch } => self.on_retry_due(epoch),
            Inbound::ParameterSets(sets) => self.on_parameter_sets(sets),
        }
        self.publish();
    }

    fn handle_media(&mut self, frame: MediaFrame) {
        match frame {
            MediaFrame::Video(unit) => {
                if let Some(recording) = self.recording.as_mut() {
                    recording.write_video(&unit);
                }
                if !self.can_send() {
                    return;
                }
                if self.parameter_sets.is_none() {
                    self.counters.video_dropped_no_parameters();
                    return;
                }
                self.variant.sender().send_video(&unit);
                self.counters.video_sent();
            }
            MediaFrame::Audio(unit) => {
                if let Some(recording) = self.recording.as_mut() {
                    recording.write_audio(&unit);
                }
                if self.can_send() {
                    self.variant.sender().send_audio(&unit);
                    self.counters.audio_sent();
                }
            }
        }
    }

    fn can_send(&mut self) -> bool {
        self.phase == StreamPhase::Live && self.variant.sender().is_connected()
    }

    fn prepare(&mut self, audio: AudioConfig, video: VideoConfig) -> Result<()> {
        if self.pipeline_running {
            return Err(SessionError::InvalidState {
                command: "prepare",
                state: self.state,
            });
        }
        let prepared = PreparedMedia { audio, video };
        self.variant.validate(prepared.codecs())?;
        self.prepare_pipeline(&prepared)?;

        tracing::info!(
            video = %video.codec,
            width = video.width,
            height = video.height,
            fps = video.fps,
            audio = %audio.codec,
            sample_rate = audio.sample_rate,
            "pipeline prepared"
        );
        self.prepared = Some(prepared);
        Ok(())
    }

    /// Audio first; video is not attempted if audio fails.
    fn prepare_pipeline(
        &mut self,
        prepared: &PreparedMedia,
    ) -> std::result::Result<(), PrepareError> {
        self.parameter_sets = None;
        if !self.pipeline.prepare_audio(&prepared.audio) {
            return Err(PrepareError::Capability(MediaKind::Audio));
        }
        if !self.pipeline.prepare_video(&prepared.video) {
            return Err(PrepareError::Capability(MediaKind::Video));
        }
        Ok(())
    }

    fn start_stream(&mut self, destination: String) -> Result<()> {
        if self.phase.is_active() {
            return Err(SessionError::InvalidState {
                command: "start stream",
                state: self.state,
            });
        }
        if destination.trim().is_empty() {
            return Err(SessionError::InvalidDestination(destination));
        }
        if self.prepared.is_none() {
            return Err(SessionError::NotPrepared);
        }

        self.cancel_retry();
        self.retry.reset();
        self.phase = StreamPhase::Live;
        self.connect(&destination);
        tracing::info!(%destination, "stream started");
        self.destination = Some(destination);
        self.ensure_pipeline();
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<()> {
        if self.phase == StreamPhase::Off {
            return Ok(());
        }
        self.cancel_retry();
        if self.phase != StreamPhase::Failed {
            self.variant.sender().disconnect();
        }
        self.phase = StreamPhase::Off;
        self.destination = None;
        tracing::info!("stream stopped");
        self.release_pipeline()
    }

    fn start_record(&mut self, target: PathBuf) -> Result<String> {
        if self.recording.is_some() {
            return Err(SessionError::InvalidState {
                command: "start record",
                state: self.state,
            });
        }
        if self.prepared.is_none() {
            return Err(SessionError::NotPrepared);
        }

        let handle = RecordingHandle::open(
            self.recorder.as_mut(),
            &target,
            self.parameter_sets.as_ref(),
        )
        .map_err(SessionError::Recording)?;
        let id = handle.id().to_string();
        self.emit(SessionEvent::RecordingStarted {
            id: id.clone(),
            target: handle.target().to_path_buf(),
        });
        self.recording = Some(handle);
        self.ensure_pipeline();
        Ok(id)
    }

    fn stop_record(&mut self) -> Result<Option<RecordingSummary>> {
        let Some(handle) = self.recording.take() else {
            return Ok(None);
        };
        let finished = self.finish_recording(handle);
        let released = self.release_pipeline();
        let summary = finished?;
        released?;
        Ok(Some(summary))
    }

    fn finish_recording(&mut self, handle: RecordingHandle) -> Result<RecordingSummary> {
        let summary = handle.finalize().map_err(SessionError::Recording)?;
        self.emit(SessionEvent::RecordingFinalized(summary.clone()));
        Ok(summary)
    }

    /// Finalize the recording, then disconnect, then stop the pipeline.
    fn teardown(&mut self) -> Result<()> {
        let finished = self
            .recording
            .take()
            .map(|handle| self.finish_recording(handle));

        self.cancel_retry();
        if self.phase.is_active() {
            self.variant.sender().disconnect();
        }
        self.phase = StreamPhase::Off;
        self.destination = None;

        if self.pipeline_running {
            self.pipeline.stop();
            self.pipeline_running = false;
        }
        self.prepared = None;
        self.parameter_sets = None;
        self.surface_ready = false;
        tracing::info!("session torn down");

        finished.transpose().map(|_| ())
    }

    /// Start the pipeline, or ask a running one for a keyframe so the new
    /// consumer can begin decoding right away.
    fn ensure_pipeline(&mut self) {
        if self.pipeline_running {
            self.pipeline.request_keyframe();
        } else {
            self.pipeline.start(self.input.clone());
            self.pipeline_running = true;
        }
    }

    /// Stop the pipeline once nothing consumes it, and re-prepare it with
    /// the last good configuration so the next start works without a new
    /// prepare.
    fn release_pipeline(&mut self) -> Result<()> {
        if self.recording.is_some() || self.phase.is_active() || !self.pipeline_running {
            return Ok(());
        }
        self.pipeline.stop();
        self.pipeline_running = false;

        let Some(prepared) = self.prepared else {
            return Ok(());
        };
        if let Err(err) = self.prepare_pipeline(&prepared) {
            tracing::warn!(error = %err, "pipeline could not be re-prepared");
            self.prepared = None;
            return Err(err.into());
        }
        Ok(())
    }

    fn connect(&mut self, destination: &str) {
        self.variant.configure(
            self.prepared.as_ref(),
            self.parameter_sets.as_ref(),
            self.auth.as_ref(),
        );
        self.variant.sender().connect(destination);
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) {
        if matches!(event, ConnectionEvent::Success) && self.phase.is_active() {
            self.on_connected();
            // Observers of Success read the getters, so publish first.
            self.publish();
            self.emit(SessionEvent::Connection(event));
            return;
        }

        self.emit(SessionEvent::Connection(event.clone()));
        match &event {
            ConnectionEvent::Failed { reason } if self.phase.is_active() => {
                self.on_connection_failed(reason.clone());
            }
            ConnectionEvent::AuthError if self.phase.is_active() => {
                self.fail_stream(Failure::Authentication);
            }
            ConnectionEvent::NewBitrate(bps) => self.counters.set_bitrate(*bps),
            ConnectionEvent::Success
            | ConnectionEvent::Failed { .. }
            | ConnectionEvent::AuthError => {
                tracing::debug!(?event, phase = ?self.phase, "connection event ignored while not streaming");
            }
            ConnectionEvent::Started { .. }
            | ConnectionEvent::Disconnected
            | ConnectionEvent::AuthSuccess => {}
        }
    }

    fn on_connected(&mut self) {
        if self.phase == StreamPhase::Reconnecting {
            tracing::info!(attempts = self.retry.attempts_used(), "reconnected");
            // The remote lost its decoder state with the old link.
            if self.pipeline_running {
                self.pipeline.request_keyframe();
            }
        }
        self.retry.on_success();
        self.phase = StreamPhase::Live;
    }

    fn on_connection_failed(&mut self, reason: String) {
        tracing::warn!(%reason, "connection failed");
        match self.retry.on_failure(&reason) {
            RetryDecision::Scheduled { attempt, delay } => self.schedule_retry(attempt, delay),
            RetryDecision::Exhausted => {
                let attempts = self.retry.attempts_used();
                self.fail_stream(Failure::RetryExhausted { reason, attempts });
            }
            RetryDecision::NotRetryable => self.fail_stream(Failure::NotRetryable { reason }),
        }
    }

    fn schedule_retry(&mut self, attempt: u32, delay: Duration) {
        self.cancel_retry();
        self.phase = StreamPhase::Reconnecting;

        let epoch = self.epoch;
        let inbound = self.inbound.clone();
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inbound.send(Inbound::RetryDue { epoch });
        }));

        let destination = self.destination.clone().unwrap_or_default();
        tracing::info!(
            attempt,
            max = self.retry.max_attempts(),
            delay_ms = delay.as_millis() as u64,
            %destination,
            "retry scheduled"
        );
        self.emit(SessionEvent::RetryScheduled {
            attempt,
            delay,
            destination,
        });
    }

    fn on_retry_due(&mut self, epoch: u64) {
        if epoch != self.epoch || self.phase != StreamPhase::Reconnecting {
            tracing::debug!(epoch, current = self.epoch, "stale retry timer ignored");
            return;
        }
        self.retry_timer = None;
        let Some(destination) = self.destination.clone() else {
            return;
        };
        tracing::info!(%destination, attempt = self.retry.attempts_used(), "reconnecting");
        self.connect(&destination);
    }

    fn cancel_retry(&mut self) {
        self.epoch += 1;
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }

    /// Give up on the stream. The recording, if any, keeps going.
    fn fail_stream(&mut self, failure: Failure) {
        self.cancel_retry();
        self.variant.sender().disconnect();
        self.phase = StreamPhase::Failed;
        tracing::warn!(%failure, "stream failed");
        self.emit(SessionEvent::Failed(failure));
        if let Err(err) = self.release_pipeline() {
            tracing::warn!(error = %err, "pipeline left unprepared after stream failure");
        }
    }

    fn manual_retry(&mut self, delay: Duration, reason: String, backup: Option<String>) -> bool {
        if self.phase == StreamPhase::Off {
            tracing::debug!("retry requested while not streaming");
            return false;
        }
        if !self.pipeline_running && self.prepared.is_none() {
            tracing::warn!("retry requested but the pipeline is not prepared");
            return false;
        }
        let RetryDecision::Scheduled { attempt, delay } = self.retry.schedule(&reason, delay) else {
            tracing::info!(%reason, remaining = self.retry.remaining(), "retry refused");
            return false;
        };

        if let Some(backup) = backup {
            tracing::info!(%backup, "switching to backup destination");
            self.destination = Some(backup);
        }
        if self.phase == StreamPhase::Live {
            self.variant.sender().disconnect();
        }
        if !self.pipeline_running {
            self.ensure_pipeline();
        }
        self.schedule_retry(attempt, delay);
        true
    }

    fn on_parameter_sets(&mut self, sets: ParameterSets) {
        tracing::debug!(
            sps = sets.sps.len(),
            pps = sets.pps.len(),
            vps = sets.vps.as_ref().map_or(0, Vec::len),
            "parameter sets received"
        );
        self.variant.sender().set_video_info(&sets);
        if let Some(recording) = self.recording.as_mut() {
            recording.write_parameter_sets(&sets);
        }
        self.parameter_sets = Some(sets);
    }

    fn publish(&mut self) {
        let recording = self.recording.is_some();
        let state = derive_state(self.surface_ready, self.phase, recording);
        let description = match self.phase {
            StreamPhase::Live => self.variant.sender().description(),
            _ => None,
        };
        {
            let mut snapshot = self.snapshot.write();
            snapshot.state = state;
            snapshot.streaming = self.phase.is_active();
            snapshot.recording = recording;
            snapshot.destination = self.destination.clone();
            snapshot.retry_attempts = self.retry.attempts_used();
            snapshot.description = description;
        }
        if state != self.state {
            tracing::debug!(from = %self.state, to = %state, "state transition");
            let from = std::mem::replace(&mut self.state, state);
            self.emit(SessionEvent::StateChanged { from, to: state });
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}
