//! Protocol senders.
//!
//! A sender owns one network connection to a remote ingest point. The
//! session drives it through [`ProtocolSender`]; outcomes come back as
//! [`ConnectionEvent`](crate::ConnectionEvent)s on the [`EventSink`] the
//! session attaches before first use.
//!
//! ## Contract
//!
//! - `connect` returns immediately. Success or failure is reported later.
//! - `disconnect` is always safe, including when nothing is connected, and
//!   no events for the torn-down attempt are emitted after it returns.
//! - Setters take effect for the next `connect` at the latest. The session
//!   re-applies all of them before every `connect`, including retries.
//! - `send_*` never block. Units offered while not connected are dropped.

pub mod generic;
pub mod rtp;

pub use generic::GenericSender;
pub use rtp::RtpSender;

use crate::codec::{AudioCodec, SenderKind, VideoCodec};
use crate::event::EventSink;
use crate::media::{AccessUnit, ParameterSets};

pub trait ProtocolSender: Send {
    fn kind(&self) -> SenderKind;

    /// Route this sender's connection events to `sink`.
    fn attach(&mut self, sink: EventSink);

    fn connect(&mut self, destination: &str);

    fn disconnect(&mut self);

    /// Whether a connection is currently established.
    fn is_connected(&self) -> bool;

    fn set_video_codec(&mut self, codec: VideoCodec);

    fn set_audio_codec(&mut self, _codec: AudioCodec) {}

    fn set_audio_info(&mut self, sample_rate: u32, stereo: bool);

    fn set_video_info(&mut self, sets: &ParameterSets);

    /// Only called for families whose
    /// [`reports_resolution`](SenderKind::reports_resolution) is true.
    fn set_video_resolution(&mut self, _width: u32, _height: u32) {}

    fn set_fps(&mut self, _fps: u32) {}

    fn set_authorization(&mut self, _user: &str, _password: &str) {}

    fn send_video(&mut self, unit: &AccessUnit);

    fn send_audio(&mut self, unit: &AccessUnit);

    /// Session description receivers need to decode the stream, for
    /// families without their own signaling. Available once connected.
    fn description(&self) -> Option<String> {
        None
    }
}

impl<S: ProtocolSender + ?Sized> ProtocolSender for Box<S> {
    fn kind(&self) -> SenderKind {
        (**self).kind()
    }

    fn attach(&mut self, sink: EventSink) {
        (**self).attach(sink)
    }

    fn connect(&mut self, destination: &str) {
        (**self).connect(destination)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn set_video_codec(&mut self, codec: VideoCodec) {
        (**self).set_video_codec(codec)
    }

    fn set_audio_codec(&mut self, codec: AudioCodec) {
        (**self).set_audio_codec(codec)
    }

    fn set_audio_info(&mut self, sample_rate: u32, stereo: bool) {
        (**self).set_audio_info(sample_rate, stereo)
    }

    fn set_video_info(&mut self, sets: &ParameterSets) {
        (**self).set_video_info(sets)
    }

    fn set_video_resolution(&mut self, width: u32, height: u32) {
        (**self).set_video_resolution(width, height)
    }

    fn set_fps(&mut self, fps: u32) {
        (**self).set_fps(fps)
    }

    fn set_authorization(&mut self, user: &str, password: &str) {
        (**self).set_authorization(user, password)
    }

    fn send_video(&mut self, unit: &AccessUnit) {
        (**self).send_video(unit)
    }

    fn send_audio(&mut self, unit: &AccessUnit) {
        (**self).send_audio(unit)
    }

    fn description(&self) -> Option<String> {
        (**self).description()
    }
}
