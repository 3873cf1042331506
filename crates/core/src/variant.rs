//! Session variants: a capture source paired with a protocol sender.
//!
//! Variants add no state-machine logic. They pick the sender, answer the
//! codec question for that sender's family, and transform the prepared
//! parameters into the setter calls the family expects.

use std::fmt;

use crate::codec::{CodecSelection, SenderKind};
use crate::config::{Credentials, PreparedMedia, VideoConfig};
use crate::error::PrepareError;
use crate::media::ParameterSets;
use crate::sender::ProtocolSender;

/// Where the pipeline's media comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    Display,
    FileReplay,
    Camera,
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Display => write!(f, "display"),
            Self::FileReplay => write!(f, "file"),
            Self::Camera => write!(f, "camera"),
        }
    }
}

/// Frame size as a receiver will see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Width and height swap for portrait rotations.
pub fn reported_resolution(video: &VideoConfig) -> Resolution {
    match video.rotation {
        90 | 270 => Resolution {
            width: video.height,
            height: video.width,
        },
        _ => Resolution {
            width: video.width,
            height: video.height,
        },
    }
}

pub struct SessionVariant {
    source: CaptureSource,
    sender: Box<dyn ProtocolSender>,
}

impl SessionVariant {
    pub fn new(source: CaptureSource, sender: impl ProtocolSender + 'static) -> Self {
        Self {
            source,
            sender: Box::new(sender),
        }
    }

    pub fn display(sender: impl ProtocolSender + 'static) -> Self {
        Self::new(CaptureSource::Display, sender)
    }

    pub fn file_replay(sender: impl ProtocolSender + 'static) -> Self {
        Self::new(CaptureSource::FileReplay, sender)
    }

    pub fn camera(sender: impl ProtocolSender + 'static) -> Self {
        Self::new(CaptureSource::Camera, sender)
    }

    pub fn source(&self) -> CaptureSource {
        self.source
    }

    pub fn kind(&self) -> SenderKind {
        self.sender.kind()
    }

    pub(crate) fn sender(&mut self) -> &mut dyn ProtocolSender {
        self.sender.as_mut()
    }

    pub(crate) fn validate(&self, codecs: CodecSelection) -> Result<(), PrepareError> {
        codecs.validate(self.sender.kind())
    }

    /// Push every piece of stream configuration into the sender.
    ///
    /// Runs before each connect, retries included, so a sender never
    /// depends on state left over from an earlier connection.
    pub(crate) fn configure(
        &mut self,
        prepared: Option<&PreparedMedia>,
        parameter_sets: Option<&ParameterSets>,
        auth: Option<&Credentials>,
    ) {
        let kind = self.sender.kind();
        if let Some(prepared) = prepared {
            self.sender.set_video_codec(prepared.video.codec);
            self.sender.set_audio_codec(prepared.audio.codec);
            self.sender
                .set_audio_info(prepared.audio.sample_rate, prepared.audio.stereo);
            if kind.reports_resolution() {
                let size = reported_resolution(&prepared.video);
                self.sender.set_video_resolution(size.width, size.height);
                self.sender.set_fps(prepared.video.fps);
            }
        }
        if let Some(sets) = parameter_sets {
            self.sender.set_video_info(sets);
        }
        if let Some(auth) = auth {
            self.sender.set_authorization(&auth.user, &auth.password);
        }
    }
}

impl fmt::Debug for SessionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionVariant")
            .field("source", &self.source)
            .field("sender", &self.sender.kind())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portrait_rotation_swaps_dimensions() {
        let mut video = VideoConfig {
            width: 1280,
            height: 720,
            ..VideoConfig::default()
        };
        for (rotation, expected) in [(0, (1280, 720)), (90, (720, 1280)), (180, (1280, 720)), (270, (720, 1280))] {
            video.rotation = rotation;
            let size = reported_resolution(&video);
            assert_eq!((size.width, size.height), expected, "rotation {rotation}");
        }
    }
}
