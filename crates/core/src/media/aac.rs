//! AAC RTP packetizer (RFC 3640, `AAC-hbr` mode).
//!
//! Each packet carries one raw AAC frame (no ADTS header) behind an
//! AU-header section:
//!
//! ```text
//! AU-headers-length (16 bits, = 16)
//! AU-header: [AU-size (13 bits) | AU-Index (3 bits, = 0)]
//! ```
//!
//! The RTP clock runs at the sample rate.

use super::Packetizer;
use super::rtp::RtpHeader;

/// Sampling frequencies indexed by `samplingFrequencyIndex` (ISO 14496-3).
const SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Largest frame AU-size can describe.
const MAX_AU_SIZE: usize = (1 << 13) - 1;

#[derive(Debug)]
pub struct AacPacketizer {
    header: RtpHeader,
    sample_rate: u32,
    channels: u8,
}

impl AacPacketizer {
    pub fn new(pt: u8, ssrc: u32, sample_rate: u32, stereo: bool) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc),
            sample_rate,
            channels: if stereo { 2 } else { 1 },
        }
    }

    pub fn with_random_ssrc(pt: u8, sample_rate: u32, stereo: bool) -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(pt),
            sample_rate,
            channels: if stereo { 2 } else { 1 },
        }
    }

    /// Two-byte AudioSpecificConfig for AAC-LC, hex encoded for `config=`.
    pub fn audio_specific_config(&self) -> String {
        let freq_index = SAMPLE_RATES
            .iter()
            .position(|&rate| rate == self.sample_rate)
            .unwrap_or(4) as u16;
        let object_type: u16 = 2;
        let config = (object_type << 11) | (freq_index << 7) | ((self.channels as u16) << 3);
        format!("{config:04x}")
    }
}

impl Packetizer for AacPacketizer {
    fn packetize(&mut self, unit: &[u8], rtp_timestamp: u32) -> Vec<Vec<u8>> {
        if unit.is_empty() {
            return Vec::new();
        }
        if unit.len() > MAX_AU_SIZE {
            tracing::warn!(bytes = unit.len(), "AAC frame exceeds AU-size field, dropped");
            return Vec::new();
        }
        let au_header = ((unit.len() as u16) << 3).to_be_bytes();
        let section = [0x00, 0x10, au_header[0], au_header[1]];
        vec![self.header.packet(true, rtp_timestamp, &[&section[..], unit])]
    }

    fn codec_name(&self) -> &'static str {
        "MPEG4-GENERIC"
    }

    fn clock_rate(&self) -> u32 {
        self.sample_rate
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    fn sdp_attributes(&self) -> Vec<String> {
        let pt = self.payload_type();
        vec![
            format!(
                "a=rtpmap:{pt} MPEG4-GENERIC/{}/{}",
                self.sample_rate, self.channels
            ),
            format!(
                "a=fmtp:{pt} streamtype=5;profile-level-id=15;mode=AAC-hbr;config={};sizelength=13;indexlength=3;indexdeltalength=3",
                self.audio_specific_config()
            ),
        ]
    }
}
