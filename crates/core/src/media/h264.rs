use base64::prelude::{BASE64_STANDARD, Engine as _};

use super::rtp::RtpHeader;
use super::{Packetizer, ParameterSets, split_nal_units};

pub(crate) const DEFAULT_MTU: usize = 1400;

/// H.264 RTP packetizer (RFC 6184).
///
/// Converts Annex B access units into RTP packets using two packetization
/// modes:
///
/// - **Single NAL Unit** (§5.6): NALs that fit within the MTU are sent
///   as-is in one packet.
///
/// - **FU-A Fragmentation** (§5.8): larger NALs are split across packets,
///   each fragment prefixed by a 2-byte FU header:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]               (up to MTU - 2 bytes)
///   ```
///
/// The marker bit is set on the last packet of the access unit (§5.1).
///
/// Parameter sets are either supplied up front via
/// [`Packetizer::set_parameter_sets`] or picked up from the
/// first unit that carries them; once known, the `a=fmtp` line includes
/// `profile-level-id` and `sprop-parameter-sets` (§8.1).
#[derive(Debug)]
pub struct H264Packetizer {
    header: RtpHeader,
    mtu: usize,
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
}

impl H264Packetizer {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self::from_header(RtpHeader::new(pt, ssrc))
    }

    pub fn with_random_ssrc(pt: u8) -> Self {
        Self::from_header(RtpHeader::with_random_ssrc(pt))
    }

    fn from_header(header: RtpHeader) -> Self {
        Self {
            header,
            mtu: DEFAULT_MTU,
            sps: None,
            pps: None,
        }
    }

    /// profile-level-id: SPS bytes 1–3 (profile_idc, constraints, level_idc).
    fn profile_level_id(&self) -> Option<String> {
        let sps = self.sps.as_deref()?;
        if sps.len() < 4 {
            return None;
        }
        Some(format!("{:02x}{:02x}{:02x}", sps[1], sps[2], sps[3]))
    }

    fn sprop_parameter_sets(&self) -> Option<String> {
        let sps = self.sps.as_deref()?;
        let pps = self.pps.as_deref()?;
        Some(format!(
            "{},{}",
            BASE64_STANDARD.encode(sps),
            BASE64_STANDARD.encode(pps)
        ))
    }

    fn capture_parameter_sets(&mut self, nals: &[&[u8]]) {
        for nal in nals {
            match nal.first().map(|b| b & 0x1f) {
                Some(7) if self.sps.is_none() => {
                    self.sps = Some(nal.to_vec());
                    tracing::debug!(bytes = nal.len(), "H.264 SPS captured from bitstream");
                }
                Some(8) if self.pps.is_none() => {
                    self.pps = Some(nal.to_vec());
                    tracing::debug!(bytes = nal.len(), "H.264 PPS captured from bitstream");
                }
                _ => {}
            }
        }
    }

    fn packetize_nal(&mut self, nal: &[u8], last_nal: bool, ts: u32) -> Vec<Vec<u8>> {
        if nal.is_empty() {
            return Vec::new();
        }
        if nal.len() <= self.mtu {
            return vec![self.header.packet(last_nal, ts, &[nal])];
        }

        let nal_type = nal[0] & 0x1f;
        let fu_indicator = (nal[0] & 0x60) | 28;
        let max_fragment = self.mtu - 2;
        let chunks: Vec<&[u8]> = nal[1..].chunks(max_fragment).collect();
        let count = chunks.len();

        let packets: Vec<Vec<u8>> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let start = if i == 0 { 0x80 } else { 0x00 };
                let end = if i + 1 == count { 0x40 } else { 0x00 };
                let fu_header = start | end | nal_type;
                let marker = last_nal && i + 1 == count;
                self.header
                    .packet(marker, ts, &[&[fu_indicator, fu_header][..], chunk])
            })
            .collect();

        tracing::trace!(
            nal_type,
            nal_size = nal.len(),
            fragments = packets.len(),
            "FU-A fragmented NAL unit"
        );
        packets
    }
}

impl Packetizer for H264Packetizer {
    fn packetize(&mut self, unit: &[u8], rtp_timestamp: u32) -> Vec<Vec<u8>> {
        let nals = split_nal_units(unit);
        if self.sps.is_none() || self.pps.is_none() {
            self.capture_parameter_sets(&nals);
        }

        let mut packets = Vec::new();
        for (i, nal) in nals.iter().enumerate() {
            let last = i + 1 == nals.len();
            packets.append(&mut self.packetize_nal(nal, last, rtp_timestamp));
        }

        tracing::trace!(
            nal_count = nals.len(),
            rtp_packets = packets.len(),
            seq = self.header.sequence(),
            ts = rtp_timestamp,
            "H.264 unit packetized"
        );
        packets
    }

    fn codec_name(&self) -> &'static str {
        "H264"
    }

    fn clock_rate(&self) -> u32 {
        90000
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    fn set_parameter_sets(&mut self, sets: &ParameterSets) {
        self.sps = Some(sets.sps.clone());
        self.pps = Some(sets.pps.clone());
    }

    /// `a=rtpmap` must precede the `a=fmtp` line that references it.
    fn sdp_attributes(&self) -> Vec<String> {
        let pt = self.payload_type();
        let mut fmtp = format!("a=fmtp:{pt} packetization-mode=1");
        if let Some(pl) = self.profile_level_id() {
            fmtp.push_str(&format!(";profile-level-id={pl}"));
        }
        if let Some(sprop) = self.sprop_parameter_sets() {
            fmtp.push_str(&format!(";sprop-parameter-sets={sprop}"));
        }
        vec![
            format!("a=rtpmap:{pt} {}/{}", self.codec_name(), self.clock_rate()),
            fmtp,
        ]
    }
}
