//! rap-booth-rs: rap performances from a topic, spoken over a beat.

mod api;
mod beat;
mod config;
mod controller;
mod generator;
mod lyrics;
mod sequencer;
mod speech;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::controller::Booth;
use crate::generator::LyricsClient;
use crate::sequencer::{PlaybackResources, Sequencer};

#[derive(Parser, Debug)]
#[command(name = "rap-booth-rs", about = "Rap performance service")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Perform one topic and exit instead of serving the control API
    #[arg(short, long)]
    topic: Option<String>,

    /// Override the control API port
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (suppress noisy ort internals)
    let filter = if args.verbose {
        EnvFilter::new("debug,ort=info")
    } else {
        EnvFilter::new("info,ort=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("rap-booth-rs starting");

    let config = config::Config::load(args.config.as_deref());

    // Load Kokoro (blocking, takes a few seconds)
    info!("Loading Kokoro TTS model...");
    let voice = tokio::task::spawn_blocking({
        let speech_config = config.speech.clone();
        move || {
            let mut voice = speech::KokoroVoice::new(&speech_config);
            voice.load_sync().map(|()| voice)
        }
    })
    .await??;
    info!(
        "Voice ready: {} at speed {}",
        config.speech.voice, config.speech.speed
    );

    let track = Arc::new(beat::BeatTrack::new(&config.beat)?);

    let sequencer = Arc::new(Sequencer::new(
        PlaybackResources {
            speech: Arc::new(voice),
            track: track.clone(),
        },
        Duration::from_secs(config.playback.utterance_timeout_secs),
    ));

    let generator = LyricsClient::new(config.generation.clone());
    let booth = Arc::new(Booth::new(generator, sequencer, track));

    if let Some(topic) = args.topic {
        booth.perform(&topic).await?;
        return Ok(());
    }

    let port = args.port.unwrap_or(config.api.port);
    api::serve(api::BoothApiState { booth }, port).await?;

    Ok(())
}
