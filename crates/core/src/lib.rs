pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod media;
pub mod pipeline;
pub mod retry;
pub mod sender;
pub mod session;
pub mod stats;
pub mod variant;

pub use codec::{AudioCodec, CodecSelection, SenderKind, VideoCodec};
pub use config::{AudioConfig, Credentials, SessionConfig, VideoConfig};
pub use error::{MediaKind, PrepareError, Result, SessionError};
pub use event::{ConnectionEvent, EventSink, Failure, SessionEvent};
pub use media::{AccessUnit, Packetizer, ParameterSets};
pub use pipeline::{MediaInput, MediaPipeline};
pub use sender::{GenericSender, ProtocolSender, RtpSender};
pub use session::{
    ElementaryStreamRecorder, RecordSink, RecordWriter, RecordingSummary, SessionState,
    StreamSession,
};
pub use stats::FrameStats;
pub use variant::{CaptureSource, SessionVariant};
