use rand::RngExt;

/// RTP fixed header builder (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Shared by every packetizer. The sequence number wraps and advances on
/// each [`write`](Self::write); the timestamp is taken per call from the
/// unit's presentation time, so packets of one unit share it.
#[derive(Debug)]
pub struct RtpHeader {
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    sequence: u16,
}

impl RtpHeader {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        tracing::debug!(
            pt,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP header state created"
        );
        Self {
            pt,
            ssrc,
            sequence: 0,
        }
    }

    /// Create with a random SSRC, as RFC 3550 §8.1 recommends.
    pub fn with_random_ssrc(pt: u8) -> Self {
        let ssrc = rand::rng().random::<u32>();
        Self::new(pt, ssrc)
    }

    /// Sequence number the next packet will carry.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Serialize a 12-byte header and advance the sequence number.
    pub fn write(&mut self, marker: bool, timestamp: u32) -> [u8; 12] {
        let mut header = [0u8; 12];
        header[0] = 2 << 6;
        header[1] = ((marker as u8) << 7) | (self.pt & 0x7f);
        header[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        header[4..8].copy_from_slice(&timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        self.sequence = self.sequence.wrapping_add(1);
        header
    }

    /// Build a full packet: header followed by `payload` parts.
    pub fn packet(&mut self, marker: bool, timestamp: u32, payload: &[&[u8]]) -> Vec<u8> {
        let len: usize = payload.iter().map(|p| p.len()).sum();
        let mut packet = Vec::with_capacity(12 + len);
        packet.extend_from_slice(&self.write(marker, timestamp));
        for part in payload {
            packet.extend_from_slice(part);
        }
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header() -> RtpHeader {
        RtpHeader::new(96, 0xAABBCCDD)
    }

    #[test]
    fn version_and_payload_type() {
        let mut h = make_header();
        let buf = h.write(false, 0);
        assert_eq!(buf[0] >> 6, 2);
        assert_eq!(buf[1] & 0x7f, 96);
    }

    #[test]
    fn marker_bit() {
        let mut h = make_header();
        assert_eq!(h.write(false, 0)[1] & 0x80, 0);
        assert_eq!(h.write(true, 0)[1] & 0x80, 0x80);
    }

    #[test]
    fn sequence_wraps() {
        let mut h = make_header();
        h.sequence = u16::MAX;
        let buf = h.write(false, 0);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), u16::MAX);
        assert_eq!(h.sequence(), 0);
    }

    #[test]
    fn timestamp_and_ssrc_written() {
        let mut h = make_header();
        let buf = h.write(false, 123_456);
        assert_eq!(u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]), 123_456);
        assert_eq!(
            u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            0xAABBCCDD
        );
    }

    #[test]
    fn packet_concatenates_payload() {
        let mut h = make_header();
        let packet = h.packet(true, 9, &[&[1, 2], &[3]]);
        assert_eq!(packet.len(), 15);
        assert_eq!(&packet[12..], &[1, 2, 3]);
    }

    #[test]
    fn random_ssrc_differs() {
        let h1 = RtpHeader::with_random_ssrc(96);
        let h2 = RtpHeader::with_random_ssrc(96);
        assert_ne!(h1.ssrc, h2.ssrc);
    }
}
