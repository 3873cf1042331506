//! Scripted sender, pipeline and recorder for driving a session in tests.
//!
//! All three write into one shared [`Journal`], so tests can assert on the
//! relative order of calls across collaborators.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use streamcast::{
    AccessUnit, AudioCodec, EventSink, MediaInput, MediaPipeline, ParameterSets, ProtocolSender,
    RecordSink, RecordWriter, SenderKind, SessionConfig, SessionEvent, SessionVariant,
    StreamSession, VideoCodec,
};
use streamcast::config::{AudioConfig, VideoConfig};
use streamcast::event::ConnectionEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(String),
    Disconnect,
    VideoCodec(VideoCodec),
    AudioCodec(AudioCodec),
    AudioInfo(u32, bool),
    VideoInfo,
    Resolution(u32, u32),
    Fps(u32),
    Auth(String, String),
    SendVideo(u64),
    SendAudio(u64),
    PrepareAudio,
    PrepareVideo,
    PipelineStart,
    PipelineStop,
    Keyframe,
    RecordOpen(PathBuf),
    RecordVideo(u64),
    RecordFinalize,
}

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    pub fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().iter().filter(|c| pred(c)).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn connects(&self) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::Connect(dest) => Some(dest.clone()),
                _ => None,
            })
            .collect()
    }
}

/// What the mock sender reports for a connection attempt.
#[derive(Debug, Clone)]
pub enum Outcome {
    Success,
    Fail(&'static str),
    AuthError,
    /// Report nothing; the attempt stays pending.
    Silent,
}

#[derive(Clone)]
pub struct Script(Arc<Mutex<(VecDeque<Outcome>, Outcome)>>);

impl Script {
    fn new() -> Self {
        Self(Arc::new(Mutex::new((VecDeque::new(), Outcome::Success))))
    }

    /// Outcomes for the next connection attempts, in order.
    pub fn then(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.0.lock().0.extend(outcomes);
    }

    /// Outcome once the queued ones are used up.
    pub fn always(&self, outcome: Outcome) {
        self.0.lock().1 = outcome;
    }

    fn next(&self) -> Outcome {
        let mut script = self.0.lock();
        let fallback = script.1.clone();
        script.0.pop_front().unwrap_or(fallback)
    }
}

pub struct MockSender {
    kind: SenderKind,
    journal: Journal,
    script: Script,
    sink: EventSink,
    remote: Arc<Mutex<Option<EventSink>>>,
    connected: bool,
}

impl ProtocolSender for MockSender {
    fn kind(&self) -> SenderKind {
        self.kind
    }

    fn attach(&mut self, sink: EventSink) {
        *self.remote.lock() = Some(sink.clone());
        self.sink = sink;
    }

    fn connect(&mut self, destination: &str) {
        self.journal.push(Call::Connect(destination.to_string()));
        self.sink.emit(ConnectionEvent::Started {
            destination: destination.to_string(),
        });
        match self.script.next() {
            Outcome::Success => {
                self.connected = true;
                self.sink.emit(ConnectionEvent::Success);
            }
            Outcome::Fail(reason) => self.sink.emit(ConnectionEvent::failed(reason)),
            Outcome::AuthError => self.sink.emit(ConnectionEvent::AuthError),
            Outcome::Silent => {}
        }
    }

    fn disconnect(&mut self) {
        self.journal.push(Call::Disconnect);
        if std::mem::take(&mut self.connected) {
            self.sink.emit(ConnectionEvent::Disconnected);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_video_codec(&mut self, codec: VideoCodec) {
        self.journal.push(Call::VideoCodec(codec));
    }

    fn set_audio_codec(&mut self, codec: AudioCodec) {
        self.journal.push(Call::AudioCodec(codec));
    }

    fn set_audio_info(&mut self, sample_rate: u32, stereo: bool) {
        self.journal.push(Call::AudioInfo(sample_rate, stereo));
    }

    fn set_video_info(&mut self, _sets: &ParameterSets) {
        self.journal.push(Call::VideoInfo);
    }

    fn set_video_resolution(&mut self, width: u32, height: u32) {
        self.journal.push(Call::Resolution(width, height));
    }

    fn set_fps(&mut self, fps: u32) {
        self.journal.push(Call::Fps(fps));
    }

    fn set_authorization(&mut self, user: &str, password: &str) {
        self.journal
            .push(Call::Auth(user.to_string(), password.to_string()));
    }

    fn send_video(&mut self, unit: &AccessUnit) {
        self.journal.push(Call::SendVideo(unit.pts_us));
    }

    fn send_audio(&mut self, unit: &AccessUnit) {
        self.journal.push(Call::SendAudio(unit.pts_us));
    }

    fn description(&self) -> Option<String> {
        self.connected.then(|| format!("{} mock session", self.kind))
    }
}

#[derive(Clone)]
pub struct PipelineControl {
    pub audio_ok: Arc<Mutex<bool>>,
    pub video_ok: Arc<Mutex<bool>>,
    input: Arc<Mutex<Option<MediaInput>>>,
}

impl PipelineControl {
    /// The input handed to the pipeline on its most recent start.
    pub fn input(&self) -> MediaInput {
        self.input
            .lock()
            .clone()
            .expect("pipeline was never started")
    }
}

pub struct MockPipeline {
    journal: Journal,
    control: PipelineControl,
}

impl MediaPipeline for MockPipeline {
    fn prepare_audio(&mut self, _config: &AudioConfig) -> bool {
        self.journal.push(Call::PrepareAudio);
        *self.control.audio_ok.lock()
    }

    fn prepare_video(&mut self, _config: &VideoConfig) -> bool {
        self.journal.push(Call::PrepareVideo);
        *self.control.video_ok.lock()
    }

    fn start(&mut self, input: MediaInput) {
        self.journal.push(Call::PipelineStart);
        *self.control.input.lock() = Some(input);
    }

    fn stop(&mut self) {
        self.journal.push(Call::PipelineStop);
    }

    fn request_keyframe(&mut self) {
        self.journal.push(Call::Keyframe);
    }
}

/// Opening any target under `/denied` fails.
pub struct MockRecorder {
    journal: Journal,
}

struct MockWriter {
    journal: Journal,
}

impl RecordSink for MockRecorder {
    fn open(
        &mut self,
        target: &Path,
        _parameter_sets: Option<&ParameterSets>,
    ) -> io::Result<Box<dyn RecordWriter>> {
        if target.starts_with("/denied") {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        self.journal.push(Call::RecordOpen(target.to_path_buf()));
        Ok(Box::new(MockWriter {
            journal: self.journal.clone(),
        }))
    }
}

impl RecordWriter for MockWriter {
    fn write_parameter_sets(&mut self, _sets: &ParameterSets) -> io::Result<()> {
        Ok(())
    }

    fn write_video(&mut self, unit: &AccessUnit) -> io::Result<()> {
        self.journal.push(Call::RecordVideo(unit.pts_us));
        Ok(())
    }

    fn write_audio(&mut self, _unit: &AccessUnit) -> io::Result<()> {
        Ok(())
    }

    fn finalize(self: Box<Self>) -> io::Result<()> {
        self.journal.push(Call::RecordFinalize);
        Ok(())
    }
}

pub struct Harness {
    pub session: StreamSession,
    pub journal: Journal,
    pub script: Script,
    pub pipeline: PipelineControl,
    pub events: broadcast::Receiver<SessionEvent>,
    remote: Arc<Mutex<Option<EventSink>>>,
}

impl Harness {
    /// Raise a connection event as if the sender had detected it.
    pub fn emit(&self, event: ConnectionEvent) {
        self.remote
            .lock()
            .as_ref()
            .expect("sender not attached")
            .emit(event);
    }
}

pub fn harness(kind: SenderKind, config: SessionConfig) -> Harness {
    let journal = Journal::default();
    let script = Script::new();
    let control = PipelineControl {
        audio_ok: Arc::new(Mutex::new(true)),
        video_ok: Arc::new(Mutex::new(true)),
        input: Arc::new(Mutex::new(None)),
    };
    let remote = Arc::new(Mutex::new(None));
    let sender = MockSender {
        kind,
        journal: journal.clone(),
        script: script.clone(),
        sink: EventSink::noop(),
        remote: Arc::clone(&remote),
        connected: false,
    };
    let pipeline = MockPipeline {
        journal: journal.clone(),
        control: control.clone(),
    };
    let recorder = MockRecorder {
        journal: journal.clone(),
    };
    let session = StreamSession::spawn_with_recorder(
        SessionVariant::display(sender),
        pipeline,
        recorder,
        config,
    );
    let events = session.subscribe();
    Harness {
        session,
        journal,
        script,
        pipeline: control,
        events,
        remote,
    }
}

pub fn rtmp() -> Harness {
    harness(SenderKind::Rtmp, SessionConfig::default())
}

pub fn with_retries(kind: SenderKind, max_retries: u32) -> Harness {
    harness(
        kind,
        SessionConfig {
            max_retries,
            retry_delay: Duration::from_millis(5000),
            ..SessionConfig::default()
        },
    )
}

pub fn parameter_sets() -> ParameterSets {
    ParameterSets::new(vec![0x67, 0x42, 0x00, 0x1e], vec![0x68, 0xce, 0x38, 0x80], None)
}

pub fn video(pts_us: u64, keyframe: bool) -> AccessUnit {
    AccessUnit::new(vec![0, 0, 0, 1, if keyframe { 0x65 } else { 0x41 }, 0x88], pts_us, keyframe)
}

/// Let the controller drain everything already queued.
///
/// Runs with paused time: the sleep only completes once every runnable
/// task is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Wait for the first event matching `pred`, skipping others.
pub async fn wait_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(3600), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

/// Drain and return everything currently buffered.
pub fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
