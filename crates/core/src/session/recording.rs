//! Local recording.
//!
//! A [`RecordSink`] opens a [`RecordWriter`] per recording. The session
//! wraps the writer in a [`RecordingHandle`], which finalizes it exactly
//! once: finalizing consumes the handle.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::media::{AccessUnit, ParameterSets};

pub trait RecordSink: Send {
    fn open(
        &mut self,
        target: &Path,
        parameter_sets: Option<&ParameterSets>,
    ) -> io::Result<Box<dyn RecordWriter>>;
}

pub trait RecordWriter: Send {
    /// Called when parameter sets arrive after the writer was opened.
    fn write_parameter_sets(&mut self, sets: &ParameterSets) -> io::Result<()>;

    fn write_video(&mut self, unit: &AccessUnit) -> io::Result<()>;

    fn write_audio(&mut self, unit: &AccessUnit) -> io::Result<()>;

    /// Flush and close the output, leaving it playable.
    fn finalize(self: Box<Self>) -> io::Result<()>;
}

/// What a finished recording produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSummary {
    pub id: String,
    pub target: PathBuf,
    pub duration: Duration,
    pub video_units: u64,
    pub audio_units: u64,
}

/// An open recording.
pub(crate) struct RecordingHandle {
    id: String,
    target: PathBuf,
    writer: Box<dyn RecordWriter>,
    started: Instant,
    video_units: u64,
    audio_units: u64,
    /// First write failure; reported when the recording is finalized.
    failed: Option<io::Error>,
}

impl RecordingHandle {
    pub(crate) fn open(
        sink: &mut dyn RecordSink,
        target: &Path,
        parameter_sets: Option<&ParameterSets>,
    ) -> io::Result<Self> {
        let writer = sink.open(target, parameter_sets)?;
        let id = recording_id();
        tracing::info!(id = %id, target = %target.display(), "recording opened");
        Ok(Self {
            id,
            target: target.to_path_buf(),
            writer,
            started: Instant::now(),
            video_units: 0,
            audio_units: 0,
            failed: None,
        })
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn target(&self) -> &Path {
        &self.target
    }

    pub(crate) fn write_parameter_sets(&mut self, sets: &ParameterSets) {
        let result = self.writer.write_parameter_sets(sets);
        self.note(result);
    }

    pub(crate) fn write_video(&mut self, unit: &AccessUnit) {
        if self.failed.is_some() {
            return;
        }
        let result = self.writer.write_video(unit);
        if result.is_ok() {
            self.video_units += 1;
        }
        self.note(result);
    }

    pub(crate) fn write_audio(&mut self, unit: &AccessUnit) {
        if self.failed.is_some() {
            return;
        }
        let result = self.writer.write_audio(unit);
        if result.is_ok() {
            self.audio_units += 1;
        }
        self.note(result);
    }

    fn note(&mut self, result: io::Result<()>) {
        if let Err(err) = result {
            if self.failed.is_none() {
                tracing::warn!(id = %self.id, error = %err, "recording write failed, further units skipped");
                self.failed = Some(err);
            }
        }
    }

    pub(crate) fn finalize(self) -> io::Result<RecordingSummary> {
        let summary = RecordingSummary {
            id: self.id,
            target: self.target,
            duration: self.started.elapsed(),
            video_units: self.video_units,
            audio_units: self.audio_units,
        };
        let finalized = self.writer.finalize();
        if let Some(err) = self.failed {
            return Err(err);
        }
        finalized?;
        tracing::info!(
            id = %summary.id,
            video_units = summary.video_units,
            audio_units = summary.audio_units,
            duration_ms = summary.duration.as_millis() as u64,
            "recording finalized"
        );
        Ok(summary)
    }
}

/// Recording ids are the local start time to the millisecond plus a
/// process-wide sequence number, so ids never repeat within a process.
fn recording_id() -> String {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{sequence}",
        chrono::Local::now().format("%Y%m%d_%H%M%S_%3f")
    )
}

/// Writes the video track as a raw Annex B elementary stream.
///
/// The output plays directly in ffplay/VLC. Audio is not muxed; audio units
/// are counted but not written.
#[derive(Debug, Default)]
pub struct ElementaryStreamRecorder;

impl ElementaryStreamRecorder {
    pub fn new() -> Self {
        Self
    }
}

impl RecordSink for ElementaryStreamRecorder {
    fn open(
        &mut self,
        target: &Path,
        parameter_sets: Option<&ParameterSets>,
    ) -> io::Result<Box<dyn RecordWriter>> {
        let file = File::create(target)?;
        let mut writer = ElementaryStreamWriter {
            out: BufWriter::new(file),
            wrote_parameter_sets: false,
        };
        if let Some(sets) = parameter_sets {
            writer.write_parameter_sets(sets)?;
        }
        Ok(Box::new(writer))
    }
}

struct ElementaryStreamWriter {
    out: BufWriter<File>,
    wrote_parameter_sets: bool,
}

impl RecordWriter for ElementaryStreamWriter {
    fn write_parameter_sets(&mut self, sets: &ParameterSets) -> io::Result<()> {
        if self.wrote_parameter_sets {
            return Ok(());
        }
        self.out.write_all(&sets.to_annex_b())?;
        self.wrote_parameter_sets = true;
        Ok(())
    }

    fn write_video(&mut self, unit: &AccessUnit) -> io::Result<()> {
        self.out.write_all(&unit.data)
    }

    fn write_audio(&mut self, _unit: &AccessUnit) -> io::Result<()> {
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> io::Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()
    }
}
