//! The boundary between capture/encode and the session.
//!
//! A [`MediaPipeline`] is whatever produces encoded media: a camera and
//! hardware encoder, a screen grabber, a file being replayed. The session
//! asks it to prepare formats and to start or stop producing; the pipeline
//! pushes its output through the [`MediaInput`] it is handed on start.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::config::{AudioConfig, VideoConfig};
use crate::media::{AccessUnit, ParameterSets};
use crate::session::Inbound;
use crate::stats::Counters;

pub trait MediaPipeline: Send {
    /// Configure the audio source and encoder. `false` means the device
    /// cannot produce this format.
    fn prepare_audio(&mut self, config: &AudioConfig) -> bool;

    fn prepare_video(&mut self, config: &VideoConfig) -> bool;

    /// Begin producing into `input`. Only called after both prepares
    /// succeeded.
    fn start(&mut self, input: MediaInput);

    /// Stop producing and release the encoders. A later `start` requires
    /// fresh prepares.
    fn stop(&mut self);

    /// Ask the video encoder for a keyframe as soon as possible.
    fn request_keyframe(&mut self) {}
}

/// One encoded unit on its way to the session.
#[derive(Debug)]
pub(crate) enum MediaFrame {
    Video(AccessUnit),
    Audio(AccessUnit),
}

/// Producer handle given to a [`MediaPipeline`].
///
/// Pushing never blocks: when the session falls behind, units are dropped
/// and counted in [`FrameStats`](crate::FrameStats).
#[derive(Clone)]
pub struct MediaInput {
    media: mpsc::Sender<MediaFrame>,
    inbound: mpsc::UnboundedSender<Inbound>,
    counters: Arc<Counters>,
}

impl MediaInput {
    pub(crate) fn new(
        media: mpsc::Sender<MediaFrame>,
        inbound: mpsc::UnboundedSender<Inbound>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            media,
            inbound,
            counters,
        }
    }

    /// Returns `false` if the unit was dropped.
    pub fn push_video(&self, unit: AccessUnit) -> bool {
        match self.media.try_send(MediaFrame::Video(unit)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.counters.video_dropped_queue();
                tracing::trace!("media queue full, video unit dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Returns `false` if the unit was dropped.
    pub fn push_audio(&self, unit: AccessUnit) -> bool {
        match self.media.try_send(MediaFrame::Audio(unit)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.counters.audio_dropped_queue();
                tracing::trace!("media queue full, audio unit dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Deliver the encoder's parameter sets.
    ///
    /// Travels ahead of any media already queued, so the session sees the
    /// sets before the first unit that depends on them.
    pub fn set_parameter_sets(&self, sets: ParameterSets) {
        if self.inbound.send(Inbound::ParameterSets(sets)).is_err() {
            tracing::debug!("session gone, parameter sets discarded");
        }
    }

    /// Whether the session is still accepting media.
    pub fn is_open(&self) -> bool {
        !self.media.is_closed()
    }
}

impl std::fmt::Debug for MediaInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaInput")
            .field("capacity", &self.media.capacity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(capacity: usize) -> (MediaInput, mpsc::Receiver<MediaFrame>, Arc<Counters>) {
        let (media_tx, media_rx) = mpsc::channel(capacity);
        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
        let counters = Arc::new(Counters::default());
        let input = MediaInput::new(media_tx, inbound_tx, Arc::clone(&counters));
        (input, media_rx, counters)
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let (input, _rx, counters) = input(2);
        assert!(input.push_video(AccessUnit::new(vec![1], 0, true)));
        assert!(input.push_audio(AccessUnit::new(vec![2], 0, false)));
        assert!(!input.push_video(AccessUnit::new(vec![3], 33_000, false)));
        assert!(!input.push_audio(AccessUnit::new(vec![4], 23_000, false)));

        let stats = counters.snapshot();
        assert_eq!(stats.video_dropped_queue, 1);
        assert_eq!(stats.audio_dropped_queue, 1);
    }

    #[test]
    fn closed_queue_is_not_counted() {
        let (input, rx, counters) = input(1);
        drop(rx);
        assert!(!input.is_open());
        assert!(!input.push_video(AccessUnit::new(vec![1], 0, true)));
        assert_eq!(counters.snapshot().video_dropped_queue, 0);
    }
}
