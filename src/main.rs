//! # mixcore player
//!
//! Command-line front end for the mixer engine: loads audio files, plays
//! them through the default output device, and reports playback progress
//! from the DSP clock while draining engine events.

use anyhow::{Context, Result};
use clap::Parser;
use mixcore::{AudioEngine, CompressionMode, EngineConfig, EventKind};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mixcore")]
#[command(about = "mixcore - multi-voice realtime audio mixer")]
#[command(version)]
struct Args {
    /// Audio files to play, in order (WAV, Ogg Vorbis, MP3, FLAC)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, default_value = "mixcore.toml")]
    config: PathBuf,

    /// Output device name (overrides config file)
    #[arg(short, long)]
    device: Option<String>,

    /// Playback volume (linear gain)
    #[arg(short, long, default_value_t = 1.0)]
    volume: f32,

    /// Decode clips fully at load instead of streaming from memory
    #[arg(long)]
    decompress: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mixcore=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let args = Args::parse();

    let mut config = EngineConfig::load(&args.config)?;
    if args.device.is_some() {
        config.device = args.device.clone();
    }

    let engine = AudioEngine::new(config);
    engine
        .initialize()
        .context("failed to initialize audio engine")?;
    info!(
        "Engine up: {:.1} ms nominal latency",
        engine.current_latency_ms()
    );

    let mode = if args.decompress {
        CompressionMode::DecompressOnLoad
    } else {
        CompressionMode::CompressInMemory
    };

    let clock = engine.clock();
    for path in &args.files {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let handle = engine
            .load(bytes, mode)
            .with_context(|| format!("failed to load {}", path.display()))?;

        let clip = engine.get_clip_info(handle)?;
        info!(
            "Playing {} ({} Hz, {} ch, {:.2}s)",
            path.display(),
            clip.sample_rate,
            clip.channels,
            clip.length_seconds
        );

        engine.set_volume(handle, args.volume)?;
        engine.play(handle)?;

        let started_at = clock.time_seconds();
        let mut last_report = 0u64;
        'playing: loop {
            while let Some(event) = engine.poll_event() {
                match event.kind {
                    EventKind::VoiceFinished if event.voice == handle => {
                        debug!("voice {} finished", event.voice);
                        break 'playing;
                    }
                    EventKind::DeviceLost => {
                        warn!("output device lost, stopping");
                        break 'playing;
                    }
                    EventKind::BufferUnderrun => {
                        warn!("buffer underrun ({} frames short)", event.param);
                    }
                    _ => {}
                }
            }

            let position = clock.time_seconds() - started_at;
            let whole_seconds = position as u64;
            if whole_seconds > last_report {
                last_report = whole_seconds;
                info!(
                    "  {:>6.1}s / {:.1}s  peak {:.3}",
                    position,
                    clip.length_seconds,
                    engine.peak_level()
                );
            }

            std::thread::sleep(Duration::from_millis(20));
        }

        engine.unload(handle)?;
    }

    engine.shutdown();
    info!("Done");
    Ok(())
}
