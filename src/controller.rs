//! Wires user actions to the generation client and the playback sequencer.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{info, warn};

use crate::generator::{GenerateError, LyricsClient};
use crate::lyrics::clean_lyrics;
use crate::sequencer::{BackingTrack, PlaybackState, SequenceError, Sequencer};

#[derive(Debug, Error)]
pub enum PerformError {
    #[error("topic is empty")]
    EmptyTopic,
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// The booth: everything a caller (HTTP handler or CLI) needs to run and
/// observe a performance.
pub struct Booth {
    generator: LyricsClient,
    sequencer: Arc<Sequencer>,
    track: Arc<dyn BackingTrack>,
    last_error: Mutex<Option<String>>,
}

impl Booth {
    pub fn new(
        generator: LyricsClient,
        sequencer: Arc<Sequencer>,
        track: Arc<dyn BackingTrack>,
    ) -> Self {
        Self {
            generator,
            sequencer,
            track,
            last_error: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.sequencer.state()
    }

    pub fn current_line(&self) -> String {
        self.sequencer.current_line()
    }

    pub fn lyrics(&self) -> Vec<String> {
        self.sequencer.lyrics()
    }

    pub fn volume(&self) -> f32 {
        self.track.volume()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    /// Set the beat volume, clamped to [0, 1]. Returns the applied value.
    pub fn set_volume(&self, volume: f32) -> f32 {
        self.track.set_volume(volume);
        self.track.volume()
    }

    pub fn stop(&self) {
        self.sequencer.stop();
    }

    /// Run one full performance: generate → clean → play. Returns when the
    /// last line has been spoken or the performance failed. Any failure
    /// resets state to idle and lands in `last_error` for the status surface.
    pub async fn perform(&self, topic: &str) -> Result<(), PerformError> {
        let result = self.perform_inner(topic).await;
        if let Err(e) = &result {
            warn!("Performance failed: {e}");
            *self.last_error.lock().unwrap() = Some(e.to_string());
        }
        result
    }

    async fn perform_inner(&self, topic: &str) -> Result<(), PerformError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PerformError::EmptyTopic);
        }

        self.sequencer.begin_generating()?;
        self.last_error.lock().unwrap().take();

        info!("Generating lyrics for topic: {topic}");
        let raw = match self.generator.generate(topic).await {
            Ok(raw) => raw,
            Err(e) => {
                self.sequencer.abort_generating();
                return Err(e.into());
            }
        };

        let script = clean_lyrics(&raw);
        info!("Kept {} of {} raw lines", script.len(), raw.lines().count());

        self.sequencer.play(script).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::sequencer::{PlaybackResources, SpeechError, SpeechSynth, UtteranceOutcome};
    use async_trait::async_trait;
    use std::time::Duration;

    struct InstantSpeech;

    #[async_trait]
    impl SpeechSynth for InstantSpeech {
        fn reset(&self) {}

        async fn speak_line(&self, _line: &str) -> Result<UtteranceOutcome, SpeechError> {
            Ok(UtteranceOutcome::Completed)
        }

        fn cancel_all(&self) {}
    }

    #[derive(Default)]
    struct FakeTrack {
        volume: Mutex<f32>,
    }

    impl BackingTrack for FakeTrack {
        fn play(&self) {}
        fn pause(&self) {}

        fn set_volume(&self, volume: f32) {
            *self.volume.lock().unwrap() = volume.clamp(0.0, 1.0);
        }

        fn volume(&self) -> f32 {
            *self.volume.lock().unwrap()
        }

        fn duck(&self) {}
    }

    fn booth() -> Booth {
        let track: Arc<dyn BackingTrack> = Arc::new(FakeTrack::default());
        let sequencer = Arc::new(Sequencer::new(
            PlaybackResources {
                speech: Arc::new(InstantSpeech),
                track: track.clone(),
            },
            Duration::from_secs(5),
        ));
        Booth::new(
            LyricsClient::new(GenerationConfig::default()),
            sequencer,
            track,
        )
    }

    #[tokio::test]
    async fn volume_round_trips_clamped() {
        let booth = booth();
        assert_eq!(booth.set_volume(0.42), 0.42);
        assert_eq!(booth.volume(), 0.42);
        assert_eq!(booth.set_volume(1.5), 1.0);
        assert_eq!(booth.set_volume(-0.3), 0.0);
    }

    #[tokio::test]
    async fn empty_topic_is_rejected_and_recorded() {
        let booth = booth();
        let result = booth.perform("   ").await;
        assert!(matches!(result, Err(PerformError::EmptyTopic)));
        assert_eq!(booth.state(), PlaybackState::Idle);
        assert!(booth.last_error().is_some());
    }

    #[tokio::test]
    async fn perform_is_rejected_while_busy() {
        let booth = booth();
        // Reserve the sequencer as an in-flight generation would.
        booth.sequencer.begin_generating().unwrap();

        let result = booth.perform("the rust borrow checker").await;
        assert!(matches!(
            result,
            Err(PerformError::Sequence(SequenceError::Busy))
        ));
        assert_eq!(booth.state(), PlaybackState::Generating);
    }

    #[tokio::test]
    async fn stop_when_idle_leaves_state_alone() {
        let booth = booth();
        booth.stop();
        assert_eq!(booth.state(), PlaybackState::Idle);
    }
}
