//! Plain RTP over UDP.
//!
//! Destinations look like `rtp://host:port`. Video goes to `port`, audio to
//! `port + 2`, leaving the odd ports for RTCP as RFC 3550 suggests. There
//! is no signaling, so receivers need the description from
//! [`RtpSender::sdp`].
//!
//! "Connecting" means resolving the host and binding a local socket. It
//! runs on a spawned task so `connect` returns immediately; a generation
//! counter makes sure a result that arrives after `disconnect` is dropped
//! on the floor instead of resurrecting the link.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::codec::{AudioCodec, SenderKind, VideoCodec};
use crate::event::{ConnectionEvent, EventSink};
use crate::media::aac::AacPacketizer;
use crate::media::g711::G711Packetizer;
use crate::media::h264::H264Packetizer;
use crate::media::h265::H265Packetizer;
use crate::media::sdp::{SdpTrack, generate_sdp};
use crate::media::{AccessUnit, Packetizer, ParameterSets};

use super::ProtocolSender;

pub(crate) const MALFORMED_ENDPOINT: &str = "Endpoint malformed, should be: rtp://ip:port";

const VIDEO_PAYLOAD_TYPE: u8 = 96;
const AUDIO_PAYLOAD_TYPE: u8 = 97;
const BITRATE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Link {
    socket: UdpSocket,
    video: SocketAddr,
    audio: SocketAddr,
}

/// Outgoing byte counter that reports once per window.
#[derive(Debug, Default)]
struct BitrateMeter {
    window_start: Option<Instant>,
    bytes: u64,
}

impl BitrateMeter {
    fn record(&mut self, bytes: usize) -> Option<u64> {
        let now = Instant::now();
        let start = *self.window_start.get_or_insert(now);
        self.bytes += bytes as u64;
        let elapsed = now.duration_since(start);
        if elapsed < BITRATE_WINDOW {
            return None;
        }
        let bps = self.bytes * 8 * 1000 / elapsed.as_millis().max(1) as u64;
        self.window_start = Some(now);
        self.bytes = 0;
        Some(bps)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

pub struct RtpSender {
    events: EventSink,
    video_codec: VideoCodec,
    audio_codec: AudioCodec,
    sample_rate: u32,
    stereo: bool,
    parameter_sets: Option<ParameterSets>,
    link: Arc<Mutex<Option<Link>>>,
    generation: Arc<AtomicU64>,
    connecting: Option<JoinHandle<()>>,
    video: Option<Box<dyn Packetizer>>,
    audio: Option<Box<dyn Packetizer>>,
    awaiting_keyframe: bool,
    meter: BitrateMeter,
}

impl RtpSender {
    pub fn new() -> Self {
        Self {
            events: EventSink::noop(),
            video_codec: VideoCodec::H264,
            audio_codec: AudioCodec::Aac,
            sample_rate: 44100,
            stereo: true,
            parameter_sets: None,
            link: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
            connecting: None,
            video: None,
            audio: None,
            awaiting_keyframe: true,
            meter: BitrateMeter::default(),
        }
    }

    /// Session description for the current connection.
    ///
    /// `None` until a connection succeeds.
    pub fn sdp(&self) -> Option<String> {
        let link = self.link.lock();
        let link = link.as_ref()?;
        let mut tracks = Vec::with_capacity(2);
        if let Some(video) = self.video.as_deref() {
            tracks.push(SdpTrack {
                media: "video",
                port: link.video.port(),
                packetizer: video,
            });
        }
        if let Some(audio) = self.audio.as_deref() {
            tracks.push(SdpTrack {
                media: "audio",
                port: link.audio.port(),
                packetizer: audio,
            });
        }
        Some(generate_sdp(&link.video.ip().to_string(), "streamcast", &tracks))
    }

    /// Invalidate the in-flight attempt and hand back whatever link it had.
    fn invalidate(&self) -> Option<Link> {
        let mut link = self.link.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        link.take()
    }

    fn abort_connecting(&mut self) -> bool {
        match self.connecting.take() {
            Some(task) => {
                let pending = !task.is_finished();
                task.abort();
                pending
            }
            None => false,
        }
    }

    fn lose_link(&mut self, err: io::Error) {
        if self.invalidate().is_some() {
            tracing::warn!(error = %err, "RTP send failed, link dropped");
            self.events.emit(ConnectionEvent::failed(err.to_string()));
        }
    }

    fn record_sent(&mut self, bytes: usize) {
        if let Some(bps) = self.meter.record(bytes) {
            self.events.emit(ConnectionEvent::NewBitrate(bps));
        }
    }
}

impl Default for RtpSender {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RtpSender {
    fn drop(&mut self) {
        self.abort_connecting();
    }
}

impl ProtocolSender for RtpSender {
    fn kind(&self) -> SenderKind {
        SenderKind::Rtp
    }

    fn attach(&mut self, sink: EventSink) {
        self.events = sink;
    }

    fn connect(&mut self, destination: &str) {
        self.events.emit(ConnectionEvent::Started {
            destination: destination.to_string(),
        });

        let Some((host, port)) = parse_destination(destination) else {
            tracing::warn!(destination, "rejecting malformed RTP destination");
            self.events.emit(ConnectionEvent::failed(MALFORMED_ENDPOINT));
            return;
        };
        let Some(video) = video_packetizer(self.video_codec, self.parameter_sets.as_ref()) else {
            self.events.emit(ConnectionEvent::failed(format!(
                "RTP cannot carry video codec {}",
                self.video_codec
            )));
            return;
        };
        let Some(audio) = audio_packetizer(self.audio_codec, self.sample_rate, self.stereo) else {
            self.events.emit(ConnectionEvent::failed(format!(
                "RTP cannot carry audio codec {}",
                self.audio_codec
            )));
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.events
                .emit(ConnectionEvent::failed("no async runtime to open the RTP socket"));
            return;
        };

        self.abort_connecting();
        if self.invalidate().is_some() {
            tracing::debug!("replacing existing RTP link");
        }
        let generation = self.generation.load(Ordering::SeqCst);

        self.video = Some(video);
        self.audio = Some(audio);
        self.awaiting_keyframe = true;
        self.meter.reset();

        let link = Arc::clone(&self.link);
        let current = Arc::clone(&self.generation);
        let events = self.events.clone();
        self.connecting = Some(runtime.spawn(async move {
            let opened = open_link(&host, port).await;
            let mut slot = link.lock();
            if current.load(Ordering::SeqCst) != generation {
                tracing::debug!(generation, "stale RTP connect result discarded");
                return;
            }
            match opened {
                Ok(opened) => {
                    tracing::info!(video = %opened.video, audio = %opened.audio, "RTP link ready");
                    *slot = Some(opened);
                    events.emit(ConnectionEvent::Success);
                }
                Err(err) => {
                    tracing::warn!(%host, port, error = %err, "RTP link failed");
                    events.emit(ConnectionEvent::failed(err.to_string()));
                }
            }
        }));
    }

    fn disconnect(&mut self) {
        let was_connecting = self.abort_connecting();
        let had_link = self.invalidate().is_some();
        self.video = None;
        self.audio = None;
        if had_link || was_connecting {
            tracing::info!("RTP link closed");
            self.events.emit(ConnectionEvent::Disconnected);
        }
    }

    fn is_connected(&self) -> bool {
        self.link.lock().is_some()
    }

    fn set_video_codec(&mut self, codec: VideoCodec) {
        self.video_codec = codec;
    }

    fn set_audio_codec(&mut self, codec: AudioCodec) {
        self.audio_codec = codec;
    }

    fn set_audio_info(&mut self, sample_rate: u32, stereo: bool) {
        self.sample_rate = sample_rate;
        self.stereo = stereo;
    }

    fn set_video_info(&mut self, sets: &ParameterSets) {
        if let Some(video) = self.video.as_mut() {
            video.set_parameter_sets(sets);
        }
        self.parameter_sets = Some(sets.clone());
    }

    fn send_video(&mut self, unit: &AccessUnit) {
        if self.awaiting_keyframe && !unit.keyframe {
            return;
        }
        let slot = self.link.lock();
        let (Some(link), Some(video)) = (slot.as_ref(), self.video.as_mut()) else {
            return;
        };

        let ts = unit.rtp_timestamp(video.clock_rate());
        let packets = match (&self.parameter_sets, unit.keyframe) {
            (Some(sets), true) => {
                let mut data = sets.to_annex_b();
                data.extend_from_slice(&unit.data);
                video.packetize(&data, ts)
            }
            _ => video.packetize(&unit.data, ts),
        };
        let result = transmit(link, &packets, link.video);
        drop(slot);

        match result {
            Ok(bytes) => {
                self.awaiting_keyframe = false;
                self.record_sent(bytes);
            }
            Err(err) => self.lose_link(err),
        }
    }

    fn send_audio(&mut self, unit: &AccessUnit) {
        let slot = self.link.lock();
        let (Some(link), Some(audio)) = (slot.as_ref(), self.audio.as_mut()) else {
            return;
        };
        let packets = audio.packetize(&unit.data, unit.rtp_timestamp(audio.clock_rate()));
        let result = transmit(link, &packets, link.audio);
        drop(slot);

        match result {
            Ok(bytes) => self.record_sent(bytes),
            Err(err) => self.lose_link(err),
        }
    }

    fn description(&self) -> Option<String> {
        self.sdp()
    }
}

/// Split `rtp://host:port[/...]` into host and video port.
fn parse_destination(destination: &str) -> Option<(String, u16)> {
    let rest = destination.strip_prefix("rtp://")?;
    let authority = rest.split('/').next()?;
    let (host, port) = authority.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port: u16 = port.parse().ok()?;
    if host.is_empty() || port == 0 || port > u16::MAX - 2 {
        return None;
    }
    Some((host.to_string(), port))
}

async fn open_link(host: &str, port: u16) -> io::Result<Link> {
    let video = tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{host} did not resolve")))?;
    let local = if video.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(local).await?;
    Ok(Link {
        socket,
        video,
        audio: SocketAddr::new(video.ip(), port + 2),
    })
}

/// Send every packet of one unit without blocking.
///
/// A full socket buffer drops the remainder of the unit; any other error
/// means the link is unusable.
fn transmit(link: &Link, packets: &[Vec<u8>], target: SocketAddr) -> io::Result<usize> {
    let mut bytes = 0;
    for (i, packet) in packets.iter().enumerate() {
        match link.socket.try_send_to(packet, target) {
            Ok(n) => bytes += n,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                tracing::debug!(dropped = packets.len() - i, %target, "socket busy, dropping rest of unit");
                break;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(bytes)
}

fn video_packetizer(
    codec: VideoCodec,
    sets: Option<&ParameterSets>,
) -> Option<Box<dyn Packetizer>> {
    let mut packetizer: Box<dyn Packetizer> = match codec {
        VideoCodec::H264 => Box::new(H264Packetizer::with_random_ssrc(VIDEO_PAYLOAD_TYPE)),
        VideoCodec::H265 => Box::new(H265Packetizer::with_random_ssrc(VIDEO_PAYLOAD_TYPE)),
        VideoCodec::Av1 => return None,
    };
    if let Some(sets) = sets {
        packetizer.set_parameter_sets(sets);
    }
    Some(packetizer)
}

fn audio_packetizer(codec: AudioCodec, sample_rate: u32, stereo: bool) -> Option<Box<dyn Packetizer>> {
    match codec {
        AudioCodec::Aac => Some(Box::new(AacPacketizer::with_random_ssrc(
            AUDIO_PAYLOAD_TYPE,
            sample_rate,
            stereo,
        ))),
        AudioCodec::G711 => Some(Box::new(G711Packetizer::with_random_ssrc(
            sample_rate,
            stereo,
            AUDIO_PAYLOAD_TYPE,
        ))),
        AudioCodec::Opus => None,
    }
}
