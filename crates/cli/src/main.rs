mod replay;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use streamcast::{
    AudioConfig, ConnectionEvent, RtpSender, SessionConfig, SessionEvent, StreamSession,
    VideoCodec, VideoConfig,
};
use tokio::sync::broadcast::error::RecvError;

use replay::FileReplay;

#[derive(Clone, Copy, ValueEnum)]
enum Codec {
    H264,
    H265,
}

impl From<Codec> for VideoCodec {
    fn from(codec: Codec) -> Self {
        match codec {
            Codec::H264 => VideoCodec::H264,
            Codec::H265 => VideoCodec::H265,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "streamcast",
    about = "Replay an Annex B video file to an RTP destination"
)]
struct Args {
    /// Annex B elementary stream to replay
    input: PathBuf,

    /// Destination, e.g. rtp://127.0.0.1:5004
    #[arg(long, short)]
    url: String,

    #[arg(long, value_enum, default_value = "h264")]
    codec: Codec,

    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Reconnection attempts after a send failure
    #[arg(long, default_value_t = 3)]
    retries: u32,

    #[arg(long, default_value_t = 5000)]
    retry_delay_ms: u64,

    /// Also record what is streamed to this file
    #[arg(long)]
    record: Option<PathBuf>,

    /// Stop at the end of the file instead of looping
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("streamcast: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let codec = VideoCodec::from(args.codec);
    let pipeline = FileReplay::open(&args.input, codec, !args.once)?;

    let session = StreamSession::file_replay(
        RtpSender::new(),
        pipeline,
        SessionConfig {
            max_retries: args.retries,
            retry_delay: Duration::from_millis(args.retry_delay_ms),
            ..SessionConfig::default()
        },
    );
    let mut events = session.subscribe();

    session
        .prepare(
            AudioConfig::default(),
            VideoConfig {
                codec,
                fps: args.fps,
                ..VideoConfig::default()
            },
        )
        .await?;
    session.start_stream(args.url.as_str()).await?;
    if let Some(target) = &args.record {
        let id = session.start_record(target).await?;
        println!("recording {id} to {}", target.display());
    }
    println!("streaming {} to {}, Ctrl-C to stop", args.input.display(), args.url);

    let mut announced = false;
    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            event = events.recv() => match event {
                Ok(SessionEvent::Failed(failure)) => break Err(failure.to_string()),
                Ok(SessionEvent::Connection(ConnectionEvent::Success)) if !announced => {
                    if let Some(sdp) = session.description() {
                        println!("session description for receivers:\n{sdp}");
                        announced = true;
                    }
                }
                Ok(SessionEvent::Connection(ConnectionEvent::NewBitrate(bps))) => {
                    tracing::debug!(kbps = bps / 1000, "bitrate");
                }
                Ok(SessionEvent::RetryScheduled { attempt, delay, .. }) => {
                    println!("connection lost, retry {attempt} in {}ms", delay.as_millis());
                }
                Ok(SessionEvent::RecordingFinalized(summary)) => {
                    println!(
                        "recording {} finalized: {} frames over {:.1}s",
                        summary.id,
                        summary.video_units,
                        summary.duration.as_secs_f64()
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event observer lagged");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    if session.is_recording() {
        session.stop_record().await?;
    }
    session.stop_stream().await?;

    let stats = session.stats();
    println!(
        "sent {} video units, dropped {} (queue) and {} (no parameter sets)",
        stats.video_sent, stats.video_dropped_queue, stats.video_dropped_no_parameters
    );
    outcome.map_err(Into::into)
}
