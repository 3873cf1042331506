//! Encoded media units and RTP packetization.
//!
//! The capture/encode pipeline hands the session [`AccessUnit`]s and a
//! one-time [`ParameterSets`] delivery. Senders that speak RTP turn units
//! into packets through a [`Packetizer`]; other families consume the units
//! directly.
//!
//! ## Supported payload formats
//!
//! | Codec | Module | RFC |
//! |-------|--------|-----|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) |
//! | H.265 | [`h265`] | [RFC 7798](https://tools.ietf.org/html/rfc7798) |
//! | AAC | [`aac`] | [RFC 3640](https://tools.ietf.org/html/rfc3640) |
//! | G.711 | [`g711`] | [RFC 3551](https://tools.ietf.org/html/rfc3551) |

pub mod aac;
pub mod g711;
pub mod h264;
pub mod h265;
pub mod rtp;
pub mod sdp;

use crate::codec::VideoCodec;

/// Annex B start code written ahead of every NAL unit we emit.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// One encoded frame (video) or frame-equivalent chunk (audio).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    /// Encoded payload. Video is Annex B; audio is raw (no ADTS).
    pub data: Vec<u8>,
    /// Presentation time in microseconds from the start of the pipeline.
    pub pts_us: u64,
    /// Whether this unit can be decoded on its own.
    pub keyframe: bool,
}

impl AccessUnit {
    pub fn new(data: Vec<u8>, pts_us: u64, keyframe: bool) -> Self {
        Self {
            data,
            pts_us,
            keyframe,
        }
    }

    /// Presentation time converted to a media clock of `clock_rate` Hz,
    /// truncated to the 32 bits RTP carries.
    pub fn rtp_timestamp(&self, clock_rate: u32) -> u32 {
        ((self.pts_us as u128 * clock_rate as u128) / 1_000_000) as u32
    }
}

/// Codec parameter sets delivered once by the encoder.
///
/// Must reach the sender before the first video unit of every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
    /// Only present for H.265.
    pub vps: Option<Vec<u8>>,
}

impl ParameterSets {
    pub fn new(sps: Vec<u8>, pps: Vec<u8>, vps: Option<Vec<u8>>) -> Self {
        Self { sps, pps, vps }
    }

    /// The parameter sets as NAL units in decoding order (VPS, SPS, PPS).
    pub fn nal_units(&self) -> Vec<&[u8]> {
        let mut nals = Vec::with_capacity(3);
        if let Some(vps) = &self.vps {
            nals.push(vps.as_slice());
        }
        nals.push(self.sps.as_slice());
        nals.push(self.pps.as_slice());
        nals
    }

    /// Annex B serialization: each set prefixed by a 4-byte start code.
    pub fn to_annex_b(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for nal in self.nal_units() {
            out.extend_from_slice(&START_CODE);
            out.extend_from_slice(nal);
        }
        out
    }

    /// Pick the parameter sets out of a list of NAL units.
    ///
    /// Returns `None` until both SPS and PPS (and VPS, for H.265) are seen.
    pub fn from_nal_units<'a>(
        codec: VideoCodec,
        nals: impl IntoIterator<Item = &'a [u8]>,
    ) -> Option<Self> {
        let mut sps = None;
        let mut pps = None;
        let mut vps = None;
        for nal in nals {
            match nal_kind(codec, nal) {
                NalKind::Vps => vps = Some(nal.to_vec()),
                NalKind::Sps => sps = Some(nal.to_vec()),
                NalKind::Pps => pps = Some(nal.to_vec()),
                _ => {}
            }
        }
        if codec == VideoCodec::H265 && vps.is_none() {
            return None;
        }
        Some(Self::new(sps?, pps?, vps))
    }
}

/// Coarse NAL classification shared by the H.264 and H.265 paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalKind {
    Vps,
    Sps,
    Pps,
    /// Coded slice of an IDR/IRAP picture.
    Keyframe,
    /// Any other coded slice.
    Slice,
    /// Access unit delimiter.
    Delimiter,
    Other,
}

/// Classify a NAL unit (without start code).
pub fn nal_kind(codec: VideoCodec, nal: &[u8]) -> NalKind {
    let Some(&first) = nal.first() else {
        return NalKind::Other;
    };
    match codec {
        VideoCodec::H265 => match (first >> 1) & 0x3f {
            32 => NalKind::Vps,
            33 => NalKind::Sps,
            34 => NalKind::Pps,
            35 => NalKind::Delimiter,
            16..=21 => NalKind::Keyframe,
            0..=9 => NalKind::Slice,
            _ => NalKind::Other,
        },
        _ => match first & 0x1f {
            7 => NalKind::Sps,
            8 => NalKind::Pps,
            9 => NalKind::Delimiter,
            5 => NalKind::Keyframe,
            // Partition A carries the slice header; B and C do not.
            1 | 2 => NalKind::Slice,
            _ => NalKind::Other,
        },
    }
}

/// Split an Annex B bitstream into NAL units, excluding start codes.
///
/// Both 4-byte `00 00 00 01` and 3-byte `00 00 01` start codes are
/// recognised, and mixed lengths within one stream are handled by tracking
/// each start code's length.
pub fn split_nal_units(data: &[u8]) -> Vec<&[u8]> {
    // (nal_data_start_index, start_code_length)
    let mut starts: Vec<(usize, usize)> = Vec::new();
    let mut i = 0usize;
    while i < data.len() {
        if i + 3 < data.len() && data[i..i + 4] == START_CODE {
            starts.push((i + 4, 4));
            i += 4;
        } else if i + 2 < data.len() && data[i..i + 3] == [0, 0, 1] {
            starts.push((i + 3, 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    starts
        .iter()
        .enumerate()
        .filter_map(|(idx, &(start, _))| {
            let end = match starts.get(idx + 1) {
                Some(&(next_start, next_len)) => next_start - next_len,
                None => data.len(),
            };
            (start < end).then(|| &data[start..end])
        })
        .collect()
}

/// Codec-specific RTP packetizer.
///
/// Each payload format implements this trait, providing:
/// - **Packetization**: splitting one access unit into RTP-sized packets
/// - **SDP attributes**: codec parameters receivers need to decode
///
/// The 12-byte header is built by [`rtp::RtpHeader`]; packetizers compose
/// it rather than reimplementing header serialization.
pub trait Packetizer: Send {
    /// Packetize one access unit into complete RTP packets.
    ///
    /// Every returned packet carries `rtp_timestamp`; the marker bit is set
    /// on the last packet of the unit where the payload format defines it.
    fn packetize(&mut self, unit: &[u8], rtp_timestamp: u32) -> Vec<Vec<u8>>;

    /// Encoding name for `a=rtpmap` (e.g. `"H264"`, `"MPEG4-GENERIC"`).
    fn codec_name(&self) -> &'static str;

    /// RTP clock rate in Hz.
    fn clock_rate(&self) -> u32;

    /// RTP payload type number (RFC 3551).
    fn payload_type(&self) -> u8;

    /// SDP media-level attribute lines, including the `a=` prefix.
    fn sdp_attributes(&self) -> Vec<String>;

    /// Codec parameter sets for SDP. Audio formats ignore them.
    fn set_parameter_sets(&mut self, _sets: &ParameterSets) {}
}
