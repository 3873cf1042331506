//! RTP sender against a loopback UDP receiver.

use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedReceiver;

use streamcast::{AccessUnit, ConnectionEvent, EventSink, ParameterSets, ProtocolSender, RtpSender};

const SPS: [u8; 4] = [0x67, 0x42, 0x00, 0x1e];
const PPS: [u8; 4] = [0x68, 0xce, 0x38, 0x80];

async fn receiver() -> UdpSocket {
    loop {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        // Audio goes to port + 2, which must stay in range.
        if socket.local_addr().unwrap().port() < 65000 {
            return socket;
        }
    }
}

async fn next_event(events: &mut UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for connection event")
        .expect("event sink dropped")
}

async fn recv_packet(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = vec![0u8; 2048];
    let n = tokio::time::timeout(Duration::from_secs(5), socket.recv(&mut buf))
        .await
        .expect("timed out waiting for RTP packet")
        .unwrap();
    buf.truncate(n);
    buf
}

fn marker(packet: &[u8]) -> bool {
    packet[1] & 0x80 != 0
}

fn sequence(packet: &[u8]) -> u16 {
    u16::from_be_bytes([packet[2], packet[3]])
}

#[tokio::test]
async fn keyframes_carry_parameter_sets() {
    let socket = receiver().await;
    let port = socket.local_addr().unwrap().port();

    let (sink, mut events) = EventSink::channel();
    let mut sender = RtpSender::new();
    sender.attach(sink);
    assert!(sender.sdp().is_none());

    sender.connect(&format!("rtp://127.0.0.1:{port}"));
    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Started { .. }));
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Success);
    assert!(sender.is_connected());

    sender.set_video_info(&ParameterSets::new(SPS.to_vec(), PPS.to_vec(), None));

    // Receivers cannot decode from a delta frame; it is never sent.
    sender.send_video(&AccessUnit::new(vec![0, 0, 0, 1, 0x41, 0x9a, 0x02], 0, false));
    sender.send_video(&AccessUnit::new(vec![0, 0, 0, 1, 0x65, 0x88, 0x84], 33_333, true));

    let sps = recv_packet(&socket).await;
    let pps = recv_packet(&socket).await;
    let idr = recv_packet(&socket).await;

    assert_eq!(sps[0] >> 6, 2, "RTP version");
    assert_eq!(sps[1] & 0x7f, 96);
    assert_eq!(&sps[12..], &SPS);
    assert_eq!(&pps[12..], &PPS);
    assert_eq!(&idr[12..], &[0x65, 0x88, 0x84]);
    assert!(!marker(&sps) && !marker(&pps) && marker(&idr));
    assert_eq!(sequence(&pps), sequence(&sps).wrapping_add(1));
    assert_eq!(&sps[4..8], &idr[4..8], "one timestamp per access unit");

    sender.send_video(&AccessUnit::new(vec![0, 0, 0, 1, 0x41, 0x9a, 0x02], 66_666, false));
    let delta = recv_packet(&socket).await;
    assert_eq!(&delta[12..], &[0x41, 0x9a, 0x02]);

    let sdp = sender.sdp().expect("sdp once connected");
    assert!(sdp.contains(&format!("m=video {port} RTP/AVP 96")), "{sdp}");
    assert!(sdp.contains("H264/90000"), "{sdp}");
    assert_eq!(sender.description().as_deref(), Some(sdp.as_str()));

    sender.disconnect();
    assert_eq!(next_event(&mut events).await, ConnectionEvent::Disconnected);
    assert!(!sender.is_connected());
    assert!(sender.sdp().is_none());
}

#[tokio::test]
async fn disconnect_before_the_link_opens_suppresses_success() {
    let socket = receiver().await;
    let port = socket.local_addr().unwrap().port();

    let (sink, mut events) = EventSink::channel();
    let mut sender = RtpSender::new();
    sender.attach(sink);
    sender.connect(&format!("rtp://127.0.0.1:{port}"));
    sender.disconnect();

    assert!(matches!(next_event(&mut events).await, ConnectionEvent::Started { .. }));
    let next = next_event(&mut events).await;
    assert_eq!(next, ConnectionEvent::Disconnected);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());
    assert!(!sender.is_connected());
}
