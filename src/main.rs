use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use talkdrill_audio::playback::SilentBackend;
use talkdrill_audio::{AudioRef, PlaybackBackend, PlayerConfig, PlayerEvent, PlayerWorker};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: talkdrill-player [--config FILE] [--silent] CHUNK.wav...";

struct Args {
    config: Option<PathBuf>,
    silent: bool,
    chunks: Vec<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        silent: false,
        chunks: Vec::new(),
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a file")?;
                args.config = Some(PathBuf::from(path));
            }
            "--silent" => args.silent = true,
            "-h" | "--help" => bail!(USAGE),
            _ => args.chunks.push(PathBuf::from(arg)),
        }
    }

    if args.chunks.is_empty() {
        bail!(USAGE);
    }
    Ok(args)
}

fn make_backend(config: &PlayerConfig) -> talkdrill_audio::Result<Box<dyn PlaybackBackend>> {
    #[cfg(feature = "audio-io")]
    if config.enable_audio_output {
        return Ok(Box::new(talkdrill_audio::audio::CpalBackend::new(config)?));
    }

    if config.enable_audio_output {
        warn!("Built without audio-io, falling back to silent playback");
    }
    Ok(Box::new(SilentBackend::new()))
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "talkdrill_audio=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => PlayerConfig::from_json_file(path)?,
        None => PlayerConfig::default(),
    };
    if args.silent {
        config = config.without_audio_output();
    }
    config.validate()?;

    info!("Starting TalkDrill chunk player with {} chunks", args.chunks.len());

    let (worker, handle) = PlayerWorker::new(&config);
    let backend_config = config.clone();
    let join = worker.start(move || make_backend(&backend_config))?;

    // Deliver the chunks last-to-first so playback has to reorder them
    let total = args.chunks.len() as u64;
    for (index, path) in args.chunks.iter().enumerate().rev() {
        handle.enqueue(AudioRef::File(path.clone()), index as u64)?;
    }

    loop {
        match handle.recv_event_timeout(Duration::from_secs(60)) {
            Some(PlayerEvent::ChunkStarted { sequence_index, .. }) => {
                let name = args
                    .chunks
                    .get(sequence_index as usize)
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                info!("Playing chunk {} ({})", sequence_index, name);
            }
            Some(PlayerEvent::Idle { next_expected_index }) if next_expected_index >= total => {
                info!("All chunks played");
                break;
            }
            Some(PlayerEvent::Error(e)) => bail!("Playback worker failed: {}", e),
            Some(PlayerEvent::Shutdown) => break,
            Some(_) => {}
            None => {
                warn!("No playback progress for 60 s, giving up");
                break;
            }
        }
    }

    handle.cleanup()?;
    handle.shutdown()?;
    if join.join().is_err() {
        bail!("Playback worker panicked");
    }

    Ok(())
}
