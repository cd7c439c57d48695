//! Background beat: a looping rodio sink with user volume and ducking.
//!
//! The track starts paused; the sequencer starts and stops it around each
//! performance. User volume and the momentary ducked gain are independent,
//! so reads always return what the user set.

use std::fs::File;
use std::io::BufReader;
use std::sync::Mutex;

use rodio::source::Source;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::BeatConfig;
use crate::sequencer::BackingTrack;

#[derive(Debug, Error)]
pub enum BeatError {
    #[error("failed to open beat file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode beat file: {0}")]
    Decode(String),
    #[error("failed to open audio output: {0}")]
    Output(String),
}

pub struct BeatTrack {
    sink: Sink,
    // Keeps the output device alive for the track's lifetime
    _stream: OutputStream,
    user_volume: Mutex<f32>,
    duck_volume: f32,
}

impl BeatTrack {
    pub fn new(config: &BeatConfig) -> Result<Self, BeatError> {
        let file = File::open(&config.path)?;
        let source = Decoder::new(BufReader::new(file))
            .map_err(|e| BeatError::Decode(e.to_string()))?
            .repeat_infinite();

        let stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| BeatError::Output(e.to_string()))?;
        let sink = Sink::connect_new(stream.mixer());
        sink.pause();
        sink.append(source);

        let volume = config.volume.clamp(0.0, 1.0);
        sink.set_volume(volume);

        info!("Beat track loaded from {} (volume {volume})", config.path);

        Ok(Self {
            sink,
            _stream: stream,
            user_volume: Mutex::new(volume),
            duck_volume: config.duck_volume.clamp(0.0, 1.0),
        })
    }
}

impl BackingTrack for BeatTrack {
    fn play(&self) {
        self.sink.play();
    }

    fn pause(&self) {
        self.sink.pause();
    }

    fn set_volume(&self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        *self.user_volume.lock().unwrap() = volume;
        self.sink.set_volume(volume);
        debug!("Beat volume set to {volume}");
    }

    fn volume(&self) -> f32 {
        *self.user_volume.lock().unwrap()
    }

    fn duck(&self) {
        self.sink.set_volume(self.duck_volume);
        debug!("Beat ducked to {}", self.duck_volume);
    }
}
