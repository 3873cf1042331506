use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the session's frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub video_sent: u64,
    pub audio_sent: u64,
    /// Units refused because the media queue was full.
    pub video_dropped_queue: u64,
    pub audio_dropped_queue: u64,
    /// Video units held back because no parameter sets were known yet.
    pub video_dropped_no_parameters: u64,
    /// Last bitrate reported by the sender, bits per second.
    pub bitrate: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    video_sent: AtomicU64,
    audio_sent: AtomicU64,
    video_dropped_queue: AtomicU64,
    audio_dropped_queue: AtomicU64,
    video_dropped_no_parameters: AtomicU64,
    bitrate: AtomicU64,
}

impl Counters {
    pub(crate) fn video_sent(&self) {
        self.video_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn audio_sent(&self) {
        self.audio_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn video_dropped_queue(&self) {
        self.video_dropped_queue.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn audio_dropped_queue(&self) {
        self.audio_dropped_queue.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn video_dropped_no_parameters(&self) {
        self.video_dropped_no_parameters
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_bitrate(&self, bps: u64) {
        self.bitrate.store(bps, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> FrameStats {
        FrameStats {
            video_sent: self.video_sent.load(Ordering::Relaxed),
            audio_sent: self.audio_sent.load(Ordering::Relaxed),
            video_dropped_queue: self.video_dropped_queue.load(Ordering::Relaxed),
            audio_dropped_queue: self.audio_dropped_queue.load(Ordering::Relaxed),
            video_dropped_no_parameters: self.video_dropped_no_parameters.load(Ordering::Relaxed),
            bitrate: self.bitrate.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            &self.video_sent,
            &self.audio_sent,
            &self.video_dropped_queue,
            &self.audio_dropped_queue,
            &self.video_dropped_no_parameters,
            &self.bitrate,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_and_reset() {
        let counters = Counters::default();
        counters.video_sent();
        counters.video_sent();
        counters.audio_dropped_queue();
        counters.set_bitrate(900_000);

        let stats = counters.snapshot();
        assert_eq!(stats.video_sent, 2);
        assert_eq!(stats.audio_dropped_queue, 1);
        assert_eq!(stats.bitrate, 900_000);

        counters.reset();
        assert_eq!(counters.snapshot(), FrameStats::default());
    }
}
