use std::time::Duration;

use crate::codec::{AudioCodec, CodecSelection, VideoCodec};
use crate::retry::DEFAULT_RETRY_DELAY;

/// Session-level configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Reconnection attempts allowed after a connection failure.
    pub max_retries: u32,
    /// Wait before each automatic reconnection attempt.
    pub retry_delay: Duration,
    /// Encoded units buffered between the pipeline and the controller.
    /// Units offered while the queue is full are dropped and counted.
    pub media_queue_capacity: usize,
    /// Capacity of the broadcast channel observers subscribe to.
    pub event_capacity: usize,
    /// Credentials forwarded to the sender before every connect.
    pub auth: Option<Credentials>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay: DEFAULT_RETRY_DELAY,
            media_queue_capacity: 256,
            event_capacity: 128,
            auth: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Audio format requested from the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub stereo: bool,
    /// Bits per second.
    pub bitrate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            codec: AudioCodec::Aac,
            sample_rate: 44100,
            stereo: true,
            bitrate: 128 * 1000,
        }
    }
}

/// Video format requested from the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConfig {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Bits per second.
    pub bitrate: u32,
    /// Capture rotation in degrees: 0, 90, 180 or 270.
    pub rotation: u16,
    /// Seconds between keyframes.
    pub iframe_interval: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            codec: VideoCodec::H264,
            width: 640,
            height: 480,
            fps: 30,
            bitrate: 1200 * 1024,
            rotation: 0,
            iframe_interval: 2,
        }
    }
}

/// The pair of formats a successful prepare committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparedMedia {
    pub audio: AudioConfig,
    pub video: VideoConfig,
}

impl PreparedMedia {
    pub fn codecs(&self) -> CodecSelection {
        CodecSelection {
            video: self.video.codec,
            audio: self.audio.codec,
        }
    }
}
