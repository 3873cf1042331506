//! H.265 (HEVC) RTP packetizer (RFC 7798).
//!
//! Differences from H.264 (RFC 6184):
//!
//! - **2-byte NAL unit header**; the type sits in bits 1..6 of the first
//!   byte.
//! - **Fragmentation Units** (§4.4.3) use a 2-byte payload header with
//!   type 49 followed by a 1-byte FU header `[S|E|FuType(6)]`.
//! - **SDP** (§7.1) carries each parameter set separately:
//!   `a=fmtp:96 sprop-vps=...;sprop-sps=...;sprop-pps=...`

use base64::prelude::{BASE64_STANDARD, Engine as _};

use super::h264::DEFAULT_MTU;
use super::rtp::RtpHeader;
use super::{Packetizer, ParameterSets, split_nal_units};

const FU_TYPE: u8 = 49;

#[derive(Debug)]
pub struct H265Packetizer {
    header: RtpHeader,
    mtu: usize,
    sets: Option<ParameterSets>,
}

impl H265Packetizer {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc),
            mtu: DEFAULT_MTU,
            sets: None,
        }
    }

    pub fn with_random_ssrc(pt: u8) -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(pt),
            mtu: DEFAULT_MTU,
            sets: None,
        }
    }

    fn packetize_nal(&mut self, nal: &[u8], last_nal: bool, ts: u32) -> Vec<Vec<u8>> {
        if nal.len() < 2 {
            return Vec::new();
        }
        if nal.len() <= self.mtu {
            return vec![self.header.packet(last_nal, ts, &[nal])];
        }

        let nal_type = (nal[0] >> 1) & 0x3f;
        // Keep F bit and the high LayerId bit, replace the type with 49.
        let payload_header = [(nal[0] & 0x81) | (FU_TYPE << 1), nal[1]];
        let chunks: Vec<&[u8]> = nal[2..].chunks(self.mtu - 3).collect();
        let count = chunks.len();

        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let start = if i == 0 { 0x80 } else { 0x00 };
                let end = if i + 1 == count { 0x40 } else { 0x00 };
                let fu_header = start | end | nal_type;
                let marker = last_nal && i + 1 == count;
                self.header
                    .packet(marker, ts, &[&payload_header[..], &[fu_header][..], chunk])
            })
            .collect()
    }
}

impl Packetizer for H265Packetizer {
    fn packetize(&mut self, unit: &[u8], rtp_timestamp: u32) -> Vec<Vec<u8>> {
        let nals = split_nal_units(unit);
        let mut packets = Vec::new();
        for (i, nal) in nals.iter().enumerate() {
            let last = i + 1 == nals.len();
            packets.append(&mut self.packetize_nal(nal, last, rtp_timestamp));
        }
        tracing::trace!(
            nal_count = nals.len(),
            rtp_packets = packets.len(),
            ts = rtp_timestamp,
            "H.265 unit packetized"
        );
        packets
    }

    fn codec_name(&self) -> &'static str {
        "H265"
    }

    fn clock_rate(&self) -> u32 {
        90000
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    fn set_parameter_sets(&mut self, sets: &ParameterSets) {
        self.sets = Some(sets.clone());
    }

    fn sdp_attributes(&self) -> Vec<String> {
        let pt = self.payload_type();
        let mut attrs = vec![format!("a=rtpmap:{pt} H265/90000")];
        if let Some(sets) = &self.sets {
            let mut fmtp = format!("a=fmtp:{pt} ");
            if let Some(vps) = &sets.vps {
                fmtp.push_str(&format!("sprop-vps={};", BASE64_STANDARD.encode(vps)));
            }
            fmtp.push_str(&format!(
                "sprop-sps={};sprop-pps={}",
                BASE64_STANDARD.encode(&sets.sps),
                BASE64_STANDARD.encode(&sets.pps)
            ));
            attrs.push(fmtp);
        }
        attrs
    }
}
