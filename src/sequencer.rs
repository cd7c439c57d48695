//! Playback sequencing: speak a script one line at a time, keep the displayed
//! line in sync, and manage the beat track underneath.
//!
//! IDLE → GENERATING → PLAYING → IDLE
//!
//! Utterances are strictly serialized: line N+1 is only issued after line N
//! finishes. Stop is immediate — one cancel-all to the speech channel, one
//! pause to the track, state back to IDLE. All state transitions happen under
//! the state lock, so a stop can never interleave with line issuance.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Generating,
    Playing,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Generating => write!(f, "GENERATING"),
            Self::Playing => write!(f, "PLAYING"),
        }
    }
}

/// How a single utterance ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech engine not loaded")]
    NotLoaded,
    #[error("model load failed: {0}")]
    Load(String),
    #[error("synthesis failed: {0}")]
    Synthesis(String),
    #[error("audio output failed: {0}")]
    Output(String),
}

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("a performance is already in progress")]
    Busy,
    #[error("speech synthesis failed: {0}")]
    Speech(#[from] SpeechError),
    #[error("speech engine stalled mid-line")]
    Stalled,
}

/// Speech-output channel: one utterance at a time, cancel kills everything.
///
/// Cancellation is sticky: once `cancel_all` fires, every `speak_line` call
/// returns `Cancelled` until `reset` starts a new sequence. That way a line
/// issued concurrently with a stop can never slip through.
#[async_trait]
pub trait SpeechSynth: Send + Sync {
    /// Clear any previous cancellation before a new sequence.
    fn reset(&self);

    /// Speak a single line, returning once playback finishes or is cancelled.
    async fn speak_line(&self, line: &str) -> Result<UtteranceOutcome, SpeechError>;

    /// Cancel the in-flight utterance and all future ones until `reset`.
    fn cancel_all(&self);
}

/// The beat bed under the spoken lines.
pub trait BackingTrack: Send + Sync {
    fn play(&self);
    fn pause(&self);
    /// Set the user volume. Values outside [0, 1] are clamped.
    fn set_volume(&self, volume: f32);
    /// The stored user volume (not the momentary ducked gain).
    fn volume(&self) -> f32;
    /// Drop the gain to the duck level without touching the user volume.
    fn duck(&self);
}

/// Audio and speech handles, owned by the controller, mutated only here.
pub struct PlaybackResources {
    pub speech: Arc<dyn SpeechSynth>,
    pub track: Arc<dyn BackingTrack>,
}

pub struct Sequencer {
    resources: PlaybackResources,
    utterance_timeout: Duration,
    state: Mutex<PlaybackState>,
    current_line: Mutex<String>,
    lyrics: Mutex<Vec<String>>,
    run_lock: AsyncMutex<()>,
}

impl Sequencer {
    pub fn new(resources: PlaybackResources, utterance_timeout: Duration) -> Self {
        Self {
            resources,
            utterance_timeout,
            state: Mutex::new(PlaybackState::Idle),
            current_line: Mutex::new(String::new()),
            lyrics: Mutex::new(Vec::new()),
            run_lock: AsyncMutex::new(()),
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.lock().unwrap()
    }

    pub fn current_line(&self) -> String {
        self.current_line.lock().unwrap().clone()
    }

    pub fn lyrics(&self) -> Vec<String> {
        self.lyrics.lock().unwrap().clone()
    }

    /// Reserve the sequencer for a new performance. Fails if one is active.
    pub fn begin_generating(&self) -> Result<(), SequenceError> {
        let mut state = self.state.lock().unwrap();
        if *state != PlaybackState::Idle {
            return Err(SequenceError::Busy);
        }
        *state = PlaybackState::Generating;
        info!("State: IDLE → GENERATING");
        Ok(())
    }

    /// Release a reservation without playing (generation failed or was empty).
    pub fn abort_generating(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == PlaybackState::Generating {
            *state = PlaybackState::Idle;
            info!("State: GENERATING → IDLE");
        }
    }

    /// Perform a script front to back. Returns when the last line has been
    /// spoken, the sequence is stopped, or the engine fails.
    pub async fn play(&self, script: Vec<String>) -> Result<(), SequenceError> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            return Err(SequenceError::Busy);
        };

        let prev = {
            let mut state = self.state.lock().unwrap();
            if *state == PlaybackState::Playing {
                return Err(SequenceError::Busy);
            }
            self.lyrics.lock().unwrap().clear();
            self.current_line.lock().unwrap().clear();

            if script.is_empty() {
                *state = PlaybackState::Idle;
                info!("Empty script, nothing to perform");
                return Ok(());
            }

            let prev = *state;
            *state = PlaybackState::Playing;
            prev
        };
        info!("State: {prev} → PLAYING ({} lines)", script.len());

        self.resources.speech.reset();

        let track = &self.resources.track;
        track.set_volume(track.volume());
        track.play();

        for (i, line) in script.iter().enumerate() {
            // Gate each line on the state lock so stop() can never race
            // with line issuance.
            {
                let state = self.state.lock().unwrap();
                if *state != PlaybackState::Playing {
                    debug!("Stopped before line {}/{}", i + 1, script.len());
                    return Ok(());
                }
                *self.current_line.lock().unwrap() = line.clone();
            }
            debug!("Line {}/{}: {line}", i + 1, script.len());

            if i == 0 {
                track.duck();
                track.play();
            }

            let spoken = tokio::time::timeout(
                self.utterance_timeout,
                self.resources.speech.speak_line(line),
            )
            .await;

            match spoken {
                Ok(Ok(UtteranceOutcome::Completed)) => {}
                Ok(Ok(UtteranceOutcome::Cancelled)) => {
                    // stop() already paused the track and reset state.
                    info!("Cancelled during line {}/{}", i + 1, script.len());
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!("Speech failed on line {}/{}: {e}", i + 1, script.len());
                    self.abort();
                    return Err(SequenceError::Speech(e));
                }
                Err(_) => {
                    warn!(
                        "Speech stalled on line {}/{} (>{:?}), aborting",
                        i + 1,
                        script.len(),
                        self.utterance_timeout
                    );
                    self.resources.speech.cancel_all();
                    self.abort();
                    return Err(SequenceError::Stalled);
                }
            }
        }

        // Natural completion: publish the full script exactly once.
        {
            let mut state = self.state.lock().unwrap();
            if *state != PlaybackState::Playing {
                // Stopped between the last utterance and here.
                return Ok(());
            }
            *state = PlaybackState::Idle;
            *self.lyrics.lock().unwrap() = script;
            self.current_line.lock().unwrap().clear();
            track.pause();
        }
        info!("Performance complete");
        Ok(())
    }

    /// Stop playback immediately. No-op when nothing is playing.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if *state != PlaybackState::Playing {
            debug!("Stop ignored, state is {}", *state);
            return;
        }
        *state = PlaybackState::Idle;
        self.resources.speech.cancel_all();
        self.resources.track.pause();
        self.current_line.lock().unwrap().clear();
        info!("State: PLAYING → IDLE (stopped)");
    }

    /// Failure path: reset to idle and silence the track.
    fn abort(&self) {
        let mut state = self.state.lock().unwrap();
        *state = PlaybackState::Idle;
        self.resources.track.pause();
        self.current_line.lock().unwrap().clear();
    }
}
