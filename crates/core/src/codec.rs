//! Codec capability table.
//!
//! Each sender family accepts a fixed set of audio and video codecs. The
//! table is consulted once, synchronously, when a session is prepared; an
//! unaccepted selection fails there and never reaches `connect`.
//!
//! | Sender | Video | Audio |
//! |--------|-------|-------|
//! | RTMP | H.264, H.265, AV1 | AAC |
//! | SRT  | H.264, H.265 | AAC |
//! | RTSP | H.264, H.265, AV1 | AAC, G.711, Opus |
//! | RTP  | H.264, H.265 | AAC, G.711 |
//! | Generic | H.264, H.265 | AAC |
//!
//! A generic sender picks RTMP, RTSP or SRT from the destination's scheme
//! at connect time, after prepare, so it only accepts what all three do.

use std::fmt;

use crate::error::{CodecName, PrepareError};

/// Video codecs a pipeline may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    H264,
    H265,
    Av1,
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "H264"),
            Self::H265 => write!(f, "H265"),
            Self::Av1 => write!(f, "AV1"),
        }
    }
}

/// Audio codecs a pipeline may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
    Aac,
    G711,
    Opus,
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aac => write!(f, "AAC"),
            Self::G711 => write!(f, "G711"),
            Self::Opus => write!(f, "OPUS"),
        }
    }
}

/// Protocol family of a [`ProtocolSender`](crate::ProtocolSender).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderKind {
    Rtmp,
    Rtsp,
    Srt,
    Rtp,
    /// Routes each connection to one of several families by URL scheme.
    Generic,
}

impl SenderKind {
    /// URL scheme prefix used by this family. `None` for [`Generic`](Self::Generic).
    pub fn scheme(&self) -> Option<&'static str> {
        match self {
            Self::Rtmp => Some("rtmp"),
            Self::Rtsp => Some("rtsp"),
            Self::Srt => Some("srt"),
            Self::Rtp => Some("rtp"),
            Self::Generic => None,
        }
    }

    /// Whether `destination` starts with this family's scheme, ignoring
    /// case. `rtmps://` counts as RTMP.
    pub fn matches(&self, destination: &str) -> bool {
        self.scheme().is_some_and(|scheme| {
            destination
                .get(..scheme.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        })
    }

    /// Whether the family reports resolution and fps ahead of `connect`.
    ///
    /// RTMP carries them in its `@setDataFrame` metadata; the others derive
    /// everything from parameter sets. A generic sender may route to RTMP.
    pub fn reports_resolution(&self) -> bool {
        matches!(self, Self::Rtmp | Self::Generic)
    }
}

impl fmt::Display for SenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rtmp => write!(f, "RTMP"),
            Self::Rtsp => write!(f, "RTSP"),
            Self::Srt => write!(f, "SRT"),
            Self::Rtp => write!(f, "RTP"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

/// The codec pair declared for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecSelection {
    pub video: VideoCodec,
    pub audio: AudioCodec,
}

impl Default for CodecSelection {
    fn default() -> Self {
        Self {
            video: VideoCodec::H264,
            audio: AudioCodec::Aac,
        }
    }
}

impl CodecSelection {
    /// Check both codecs against the table for `sender`.
    ///
    /// Audio is checked first: it is the half that differs most across
    /// families.
    pub fn validate(&self, sender: SenderKind) -> Result<(), PrepareError> {
        if !accepts_audio(sender, self.audio) {
            return Err(PrepareError::Configuration {
                sender,
                codec: CodecName::Audio(self.audio),
            });
        }
        if !accepts_video(sender, self.video) {
            return Err(PrepareError::Configuration {
                sender,
                codec: CodecName::Video(self.video),
            });
        }
        Ok(())
    }
}

/// Whether `sender` can carry `codec` audio.
pub fn accepts_audio(sender: SenderKind, codec: AudioCodec) -> bool {
    use AudioCodec::*;
    match sender {
        SenderKind::Rtmp | SenderKind::Srt | SenderKind::Generic => codec == Aac,
        SenderKind::Rtsp => matches!(codec, Aac | G711 | Opus),
        SenderKind::Rtp => matches!(codec, Aac | G711),
    }
}

/// Whether `sender` can carry `codec` video.
pub fn accepts_video(sender: SenderKind, codec: VideoCodec) -> bool {
    use VideoCodec::*;
    match sender {
        SenderKind::Rtmp | SenderKind::Rtsp => matches!(codec, H264 | H265 | Av1),
        SenderKind::Srt | SenderKind::Rtp | SenderKind::Generic => matches!(codec, H264 | H265),
    }
}
