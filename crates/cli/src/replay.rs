//! A [`MediaPipeline`] that replays an Annex B elementary stream file.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use streamcast::media::{NalKind, nal_kind, split_nal_units};
use streamcast::{AccessUnit, AudioConfig, MediaInput, MediaPipeline, ParameterSets, VideoCodec, VideoConfig};
use tokio::task::JoinHandle;

/// One picture: its NAL units, each prefixed with a 4-byte start code.
struct Picture {
    data: Vec<u8>,
    keyframe: bool,
}

pub struct FileReplay {
    codec: VideoCodec,
    pictures: Arc<Vec<Picture>>,
    parameter_sets: Option<ParameterSets>,
    fps: u32,
    looping: bool,
    keyframe_wanted: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileReplay {
    pub fn open(path: &Path, codec: VideoCodec, looping: bool) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let nals = split_nal_units(&bytes);
        let parameter_sets = ParameterSets::from_nal_units(codec, nals.iter().copied());
        let pictures = group_pictures(codec, &nals);
        if pictures.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("no {codec} pictures in {}", path.display()),
            ));
        }
        tracing::info!(
            path = %path.display(),
            pictures = pictures.len(),
            keyframes = pictures.iter().filter(|p| p.keyframe).count(),
            "replay file loaded"
        );
        Ok(Self {
            codec,
            pictures: Arc::new(pictures),
            parameter_sets,
            fps: 30,
            looping,
            keyframe_wanted: Arc::new(AtomicBool::new(false)),
            task: None,
        })
    }
}

/// Split the stream into pictures. A picture ends where the next one
/// begins: at an access unit delimiter, at a parameter set or prefix NAL
/// following a slice, or at a slice flagged as the first of its picture.
/// Parameter sets and delimiters are dropped here; the session sends
/// parameter sets itself.
fn group_pictures(codec: VideoCodec, nals: &[&[u8]]) -> Vec<Picture> {
    let mut pictures = Vec::new();
    let mut pending = Vec::new();
    let mut has_slice = false;
    let mut keyframe = false;
    for nal in nals {
        let kind = nal_kind(codec, nal);
        if has_slice && starts_picture(codec, kind, nal) {
            pictures.push(Picture {
                data: std::mem::take(&mut pending),
                keyframe,
            });
            has_slice = false;
            keyframe = false;
        }
        match kind {
            NalKind::Vps | NalKind::Sps | NalKind::Pps | NalKind::Delimiter => continue,
            NalKind::Keyframe => {
                has_slice = true;
                keyframe = true;
            }
            NalKind::Slice => has_slice = true,
            NalKind::Other => {}
        }
        pending.extend_from_slice(&[0, 0, 0, 1]);
        pending.extend_from_slice(nal);
    }
    if has_slice {
        pictures.push(Picture {
            data: pending,
            keyframe,
        });
    }
    pictures
}

fn starts_picture(codec: VideoCodec, kind: NalKind, nal: &[u8]) -> bool {
    match kind {
        NalKind::Delimiter | NalKind::Vps | NalKind::Sps | NalKind::Pps => true,
        // first_mb_in_slice == 0 (ue(v) coded as a lone 1 bit) or
        // first_slice_segment_in_pic_flag, right after the NAL header.
        NalKind::Keyframe | NalKind::Slice => {
            let header_len = if codec == VideoCodec::H265 { 2 } else { 1 };
            nal.get(header_len).is_some_and(|byte| byte & 0x80 != 0)
        }
        NalKind::Other => is_prefix_nal(codec, nal),
    }
}

/// SEI and reserved types that may only precede the first slice of a picture.
fn is_prefix_nal(codec: VideoCodec, nal: &[u8]) -> bool {
    let Some(&first) = nal.first() else {
        return false;
    };
    match codec {
        VideoCodec::H265 => matches!((first >> 1) & 0x3f, 39 | 41..=44 | 48..=55),
        _ => matches!(first & 0x1f, 6 | 14..=18),
    }
}

impl MediaPipeline for FileReplay {
    /// The file carries no audio; any format is accepted and nothing is
    /// produced.
    fn prepare_audio(&mut self, _config: &AudioConfig) -> bool {
        true
    }

    fn prepare_video(&mut self, config: &VideoConfig) -> bool {
        if config.codec != self.codec || config.fps == 0 {
            tracing::warn!(requested = %config.codec, file = %self.codec, "cannot replay in this format");
            return false;
        }
        self.fps = config.fps;
        true
    }

    fn start(&mut self, input: MediaInput) {
        if let Some(sets) = self.parameter_sets.clone() {
            input.set_parameter_sets(sets);
        } else {
            tracing::warn!("replay file has no parameter sets; receivers may not decode");
        }

        let pictures = Arc::clone(&self.pictures);
        let keyframe_wanted = Arc::clone(&self.keyframe_wanted);
        let frame = Duration::from_secs(1) / self.fps;
        let looping = self.looping;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame);
            let mut index = 0usize;
            let mut pts_us = 0u64;
            loop {
                ticker.tick().await;
                if keyframe_wanted.swap(false, Ordering::Relaxed) {
                    index = next_keyframe(&pictures, index);
                }
                if index >= pictures.len() {
                    if !looping {
                        tracing::info!("replay finished");
                        return;
                    }
                    index = 0;
                }
                let picture = &pictures[index];
                input.push_video(AccessUnit::new(picture.data.clone(), pts_us, picture.keyframe));
                index += 1;
                pts_us += frame.as_micros() as u64;
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn request_keyframe(&mut self) {
        self.keyframe_wanted.store(true, Ordering::Relaxed);
    }
}

/// Index of the first keyframe at or after `from`, wrapping once.
fn next_keyframe(pictures: &[Picture], from: usize) -> usize {
    (from..pictures.len())
        .chain(0..from)
        .find(|&i| pictures[i].keyframe)
        .unwrap_or(from)
}
