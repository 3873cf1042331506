//! G.711 A-law RTP packetizer (RFC 3551 §4.5.14).
//!
//! Static payload type 8 means 8000 Hz mono. Any other rate or channel
//! count goes out on the dynamic payload type the caller supplies, with
//! the real rate and channels in the rtpmap. Samples are split into MTU-sized chunks; every chunk of one unit shares
//! the unit's timestamp.

use super::Packetizer;
use super::h264::DEFAULT_MTU;
use super::rtp::RtpHeader;

pub const PCMA_PAYLOAD_TYPE: u8 = 8;

const PCMA_STATIC_RATE: u32 = 8000;

#[derive(Debug)]
pub struct G711Packetizer {
    header: RtpHeader,
    sample_rate: u32,
    stereo: bool,
}

impl G711Packetizer {
    pub fn new(ssrc: u32, sample_rate: u32, stereo: bool, dynamic_pt: u8) -> Self {
        let pt = select_payload_type(sample_rate, stereo, dynamic_pt);
        Self {
            header: RtpHeader::new(pt, ssrc),
            sample_rate,
            stereo,
        }
    }

    pub fn with_random_ssrc(sample_rate: u32, stereo: bool, dynamic_pt: u8) -> Self {
        let pt = select_payload_type(sample_rate, stereo, dynamic_pt);
        Self {
            header: RtpHeader::with_random_ssrc(pt),
            sample_rate,
            stereo,
        }
    }
}

fn select_payload_type(sample_rate: u32, stereo: bool, dynamic_pt: u8) -> u8 {
    if sample_rate == PCMA_STATIC_RATE && !stereo {
        PCMA_PAYLOAD_TYPE
    } else {
        dynamic_pt
    }
}

impl Packetizer for G711Packetizer {
    fn packetize(&mut self, unit: &[u8], rtp_timestamp: u32) -> Vec<Vec<u8>> {
        unit.chunks(DEFAULT_MTU)
            .map(|chunk| self.header.packet(false, rtp_timestamp, &[chunk]))
            .collect()
    }

    fn codec_name(&self) -> &'static str {
        "PCMA"
    }

    fn clock_rate(&self) -> u32 {
        self.sample_rate
    }

    fn payload_type(&self) -> u8 {
        self.header.pt
    }

    fn sdp_attributes(&self) -> Vec<String> {
        let channels = if self.stereo { "/2" } else { "" };
        vec![format!(
            "a=rtpmap:{} PCMA/{}{channels}",
            self.header.pt, self.sample_rate
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_mtu() {
        let mut p = G711Packetizer::new(1, 8000, false, 97);
        let packets = p.packetize(&vec![0xD5; DEFAULT_MTU + 10], 160);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].len(), 12 + DEFAULT_MTU);
        assert_eq!(packets[1].len(), 12 + 10);
        assert_eq!(packets[0][1] & 0x7f, PCMA_PAYLOAD_TYPE);
    }

    #[test]
    fn static_payload_type_only_at_8000_mono() {
        let p = G711Packetizer::new(1, 8000, false, 97);
        assert_eq!(p.payload_type(), PCMA_PAYLOAD_TYPE);
        assert_eq!(p.sdp_attributes(), vec!["a=rtpmap:8 PCMA/8000"]);

        let p = G711Packetizer::new(1, 44100, false, 97);
        assert_eq!(p.payload_type(), 97);
        assert_eq!(p.sdp_attributes(), vec!["a=rtpmap:97 PCMA/44100"]);

        let p = G711Packetizer::new(1, 8000, true, 97);
        assert_eq!(p.payload_type(), 97);
        assert_eq!(p.sdp_attributes(), vec!["a=rtpmap:97 PCMA/8000/2"]);
    }

    #[test]
    fn empty_unit_yields_nothing() {
        let mut p = G711Packetizer::new(1, 8000, false, 97);
        assert!(p.packetize(&[], 0).is_empty());
    }
}
