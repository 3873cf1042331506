//! SDP (Session Description Protocol) generation (RFC 8866).
//!
//! Plain RTP has no signaling, so receivers such as ffplay need a session
//! description file to know the payload formats. The format:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=- 0 0 IN IP4 <addr>                        ← origin
//! s=<session-name>                             ← session name
//! c=IN IP4 <addr>                              ← connection address
//! t=0 0                                        ← timing (live stream)
//! a=tool:streamcast                            ← sender software
//! m=video <port> RTP/AVP 96                    ← one block per track
//! a=rtpmap:96 H264/90000
//! a=fmtp:96 packetization-mode=1
//! ```

use super::Packetizer;

/// One `m=` block: media type, destination port and its packetizer.
pub struct SdpTrack<'a> {
    pub media: &'static str,
    pub port: u16,
    pub packetizer: &'a dyn Packetizer,
}

/// Generate a session description for the given tracks.
pub fn generate_sdp(ip: &str, session_name: &str, tracks: &[SdpTrack<'_>]) -> String {
    let mut sdp: Vec<String> = vec![
        "v=0".to_string(),
        format!("o=- 0 0 IN IP4 {ip}"),
        format!("s={session_name}"),
        format!("c=IN IP4 {ip}"),
        "t=0 0".to_string(),
        "a=tool:streamcast".to_string(),
    ];

    for track in tracks {
        sdp.push(format!(
            "m={} {} RTP/AVP {}",
            track.media,
            track.port,
            track.packetizer.payload_type()
        ));
        sdp.extend(track.packetizer.sdp_attributes());
    }

    tracing::debug!(sdp = %sdp.join("\\r\\n"), "generated SDP");

    format!("{}\r\n", sdp.join("\r\n"))
}
