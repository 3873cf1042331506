//! One sender per family, picked by the destination's URL scheme.
//!
//! Configuration setters go to every family, because the session applies
//! them before `connect` and the family is only known once the destination
//! is. Connection, sends and the description go to the routed family only.

use crate::codec::{AudioCodec, SenderKind, VideoCodec};
use crate::event::{ConnectionEvent, EventSink};
use crate::media::{AccessUnit, ParameterSets};

use super::ProtocolSender;

pub struct GenericSender {
    senders: Vec<Box<dyn ProtocolSender>>,
    routed: Option<usize>,
    events: EventSink,
}

impl GenericSender {
    /// Route between `senders`. The first sender whose scheme matches a
    /// destination wins.
    pub fn new(senders: Vec<Box<dyn ProtocolSender>>) -> Self {
        Self {
            senders,
            routed: None,
            events: EventSink::noop(),
        }
    }

    /// Add a family.
    pub fn with(mut self, sender: impl ProtocolSender + 'static) -> Self {
        self.senders.push(Box::new(sender));
        self
    }

    /// Family of the current or most recent connection attempt.
    pub fn routed(&self) -> Option<SenderKind> {
        self.routed.map(|i| self.senders[i].kind())
    }

    fn active(&mut self) -> Option<&mut Box<dyn ProtocolSender>> {
        self.routed.map(|i| &mut self.senders[i])
    }

    fn unsupported(&self) -> String {
        let schemes: Vec<&str> = self
            .senders
            .iter()
            .filter_map(|sender| sender.kind().scheme())
            .collect();
        format!(
            "Endpoint malformed, unsupported protocol. Only support {}",
            schemes.join(", ")
        )
    }
}

impl ProtocolSender for GenericSender {
    fn kind(&self) -> SenderKind {
        SenderKind::Generic
    }

    fn attach(&mut self, sink: EventSink) {
        for sender in &mut self.senders {
            sender.attach(sink.clone());
        }
        self.events = sink;
    }

    fn connect(&mut self, destination: &str) {
        let Some(index) = self
            .senders
            .iter()
            .position(|sender| sender.kind().matches(destination))
        else {
            tracing::warn!(destination, "no sender for destination scheme");
            self.routed = None;
            self.events.emit(ConnectionEvent::Started {
                destination: destination.to_string(),
            });
            self.events.emit(ConnectionEvent::failed(self.unsupported()));
            return;
        };

        if let Some(previous) = self.routed.filter(|&previous| previous != index) {
            self.senders[previous].disconnect();
        }
        self.routed = Some(index);
        tracing::debug!(family = %self.senders[index].kind(), destination, "destination routed");
        self.senders[index].connect(destination);
    }

    fn disconnect(&mut self) {
        if let Some(sender) = self.active() {
            sender.disconnect();
        }
    }

    fn is_connected(&self) -> bool {
        self.routed.is_some_and(|i| self.senders[i].is_connected())
    }

    fn set_video_codec(&mut self, codec: VideoCodec) {
        for sender in &mut self.senders {
            sender.set_video_codec(codec);
        }
    }

    fn set_audio_codec(&mut self, codec: AudioCodec) {
        for sender in &mut self.senders {
            sender.set_audio_codec(codec);
        }
    }

    fn set_audio_info(&mut self, sample_rate: u32, stereo: bool) {
        for sender in &mut self.senders {
            sender.set_audio_info(sample_rate, stereo);
        }
    }

    fn set_video_info(&mut self, sets: &ParameterSets) {
        for sender in &mut self.senders {
            sender.set_video_info(sets);
        }
    }

    fn set_video_resolution(&mut self, width: u32, height: u32) {
        for sender in self
            .senders
            .iter_mut()
            .filter(|sender| sender.kind().reports_resolution())
        {
            sender.set_video_resolution(width, height);
        }
    }

    fn set_fps(&mut self, fps: u32) {
        for sender in self
            .senders
            .iter_mut()
            .filter(|sender| sender.kind().reports_resolution())
        {
            sender.set_fps(fps);
        }
    }

    fn set_authorization(&mut self, user: &str, password: &str) {
        for sender in &mut self.senders {
            sender.set_authorization(user, password);
        }
    }

    fn send_video(&mut self, unit: &AccessUnit) {
        if let Some(sender) = self.active() {
            sender.send_video(unit);
        }
    }

    fn send_audio(&mut self, unit: &AccessUnit) {
        if let Some(sender) = self.active() {
            sender.send_audio(unit);
        }
    }

    fn description(&self) -> Option<String> {
        self.routed.and_then(|i| self.senders[i].description())
    }
}

impl std::fmt::Debug for GenericSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let families: Vec<SenderKind> = self.senders.iter().map(|s| s.kind()).collect();
        f.debug_struct("GenericSender")
            .field("families", &families)
            .field("routed", &self.routed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::retry::{RetryDecision, RetryPolicy};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Family {
        kind: SenderKind,
        log: Log,
        connected: bool,
    }

    impl Family {
        fn new(kind: SenderKind, log: &Log) -> Self {
            Self {
                kind,
                log: Arc::clone(log),
                connected: false,
            }
        }

        fn note(&self, call: &str) {
            self.log.lock().push(format!("{}:{call}", self.kind));
        }
    }

    impl ProtocolSender for Family {
        fn kind(&self) -> SenderKind {
            self.kind
        }

        fn attach(&mut self, _sink: EventSink) {}

        fn connect(&mut self, destination: &str) {
            self.note(&format!("connect {destination}"));
            self.connected = true;
        }

        fn disconnect(&mut self) {
            self.note("disconnect");
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn set_video_codec(&mut self, codec: VideoCodec) {
            self.note(&format!("codec {codec}"));
        }

        fn set_audio_info(&mut self, _sample_rate: u32, _stereo: bool) {}

        fn set_video_info(&mut self, _sets: &ParameterSets) {}

        fn set_video_resolution(&mut self, width: u32, height: u32) {
            self.note(&format!("resolution {width}x{height}"));
        }

        fn send_video(&mut self, unit: &AccessUnit) {
            self.note(&format!("video {}", unit.pts_us));
        }

        fn send_audio(&mut self, _unit: &AccessUnit) {}

        fn description(&self) -> Option<String> {
            self.connected.then(|| format!("{} description", self.kind))
        }
    }

    fn generic(log: &Log) -> GenericSender {
        GenericSender::new(Vec::new())
            .with(Family::new(SenderKind::Rtmp, log))
            .with(Family::new(SenderKind::Rtsp, log))
            .with(Family::new(SenderKind::Srt, log))
    }

    #[test]
    fn routes_by_scheme() {
        let log = Log::default();
        let mut sender = generic(&log);
        assert_eq!(sender.routed(), None);
        assert_eq!(sender.description(), None);

        sender.connect("RTSP://camera.local/live");
        assert_eq!(sender.routed(), Some(SenderKind::Rtsp));
        assert!(sender.is_connected());
        sender.send_video(&AccessUnit::new(vec![0x65], 40, true));
        assert_eq!(sender.description().as_deref(), Some("RTSP description"));

        assert_eq!(
            *log.lock(),
            vec!["RTSP:connect RTSP://camera.local/live", "RTSP:video 40"]
        );
    }

    #[test]
    fn setters_fan_out_before_routing() {
        let log = Log::default();
        let mut sender = generic(&log);
        sender.set_video_codec(VideoCodec::H265);
        sender.set_video_resolution(720, 1280);

        assert_eq!(
            *log.lock(),
            vec![
                "RTMP:codec H265",
                "RTSP:codec H265",
                "SRT:codec H265",
                "RTMP:resolution 720x1280",
            ]
        );
    }

    #[test]
    fn switching_family_disconnects_the_previous_one() {
        let log = Log::default();
        let mut sender = generic(&log);
        sender.connect("rtmp://a/live/key");
        sender.connect("srt://b:9000");
        assert_eq!(sender.routed(), Some(SenderKind::Srt));
        assert!(log.lock().contains(&"RTMP:disconnect".to_string()));
    }

    #[test]
    fn unknown_scheme_fails_without_retry() {
        let log = Log::default();
        let (sink, mut events) = EventSink::channel();
        let mut sender = generic(&log);
        sender.attach(sink);
        sender.connect("http://example.com/live");

        assert!(matches!(events.try_recv(), Ok(ConnectionEvent::Started { .. })));
        let Ok(ConnectionEvent::Failed { reason }) = events.try_recv() else {
            panic!("expected a connection failure");
        };
        assert!(reason.ends_with("rtmp, rtsp, srt"), "{reason}");
        assert_eq!(
            RetryPolicy::new(3, Duration::from_secs(1)).on_failure(&reason),
            RetryDecision::NotRetryable
        );
        assert!(log.lock().is_empty());
        assert!(!sender.is_connected());
    }
}
