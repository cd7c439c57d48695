//! Kokoro speech engine: lyric line → phonemes → ONNX inference → playback.
//!
//! Pipeline per line:
//! 1. Line → phonemes (misaki-rs G2P)
//! 2. Phonemes → token IDs (tokenizer.json vocabulary)
//! 3. Token IDs + voice style + speed → ONNX inference → f32 audio (24kHz)
//! 4. Audio → rodio Sink playback with cancellation

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use ndarray::{Array2, Array3};
use ndarray_npy::NpzReader;
use ort::value::Tensor;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamBuilder, Sink};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::config::SpeechConfig;
use crate::sequencer::{SpeechError, SpeechSynth, UtteranceOutcome};

const SAMPLE_RATE: u32 = 24000;
const MAX_TOKENS: usize = 510; // Voice style array first dimension

/// Style vectors for one voice, indexed by token count. shape: (510, 256)
struct VoiceStyle {
    styles: Array2<f32>,
}

/// Native Kokoro TTS engine, fixed to one voice and speed for the whole run.
pub struct KokoroVoice {
    // ONNX model (Mutex because ort 2.0 Session::run needs &mut)
    session: Mutex<Option<ort::session::Session>>,

    // Phonemizer (misaki-rs G2P)
    phonemizer: Option<misaki_rs::G2P>,

    // Tokenizer vocabulary: char → token ID
    vocab: HashMap<char, i64>,

    // Style data for the configured voice
    style: Option<VoiceStyle>,

    voice: String,
    speed: f32,

    // Audio output (kept alive for the engine's lifetime)
    output_stream: Option<OutputStream>,

    cancelled: Arc<AtomicBool>,
    active_sink: Arc<Mutex<Option<Sink>>>,
    line_lock: AsyncMutex<()>,

    model_path: PathBuf,
    voices_path: PathBuf,
    tokenizer_path: PathBuf,
}

impl KokoroVoice {
    pub fn new(config: &SpeechConfig) -> Self {
        let base_dir = std::env::current_dir().unwrap_or_default();

        let model_path = if config.model_path.is_empty() {
            base_dir.join("kokoro-v1.0.onnx")
        } else {
            PathBuf::from(&config.model_path)
        };

        let voices_path = base_dir.join("voices-v1.0.bin");
        let tokenizer_path = base_dir.join("tokenizer.json");

        Self {
            session: Mutex::new(None),
            phonemizer: None,
            vocab: HashMap::new(),
            style: None,
            voice: config.voice.clone(),
            speed: config.speed,
            output_stream: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            active_sink: Arc::new(Mutex::new(None)),
            line_lock: AsyncMutex::new(()),
            model_path,
            voices_path,
            tokenizer_path,
        }
    }

    /// Load the ONNX model, tokenizer, voice style, and phonemizer.
    /// Blocking; call before the runtime is busy with anything else.
    pub fn load_sync(&mut self) -> Result<(), SpeechError> {
        let t0 = Instant::now();

        info!("Loading tokenizer from {}", self.tokenizer_path.display());
        let contents = fs::read_to_string(&self.tokenizer_path)
            .map_err(|e| SpeechError::Load(format!("failed to read tokenizer: {e}")))?;
        self.vocab = parse_vocab(&contents)?;
        info!("Tokenizer loaded: {} tokens", self.vocab.len());

        info!("Loading voice '{}' from {}", self.voice, self.voices_path.display());
        self.style = Some(load_voice_style(&self.voices_path, &self.voice)?);

        info!("Loading ONNX model from {}", self.model_path.display());
        let session = ort::session::Session::builder()
            .map_err(|e| SpeechError::Load(format!("failed to create ONNX session builder: {e}")))?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(|e| SpeechError::Load(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(4)
            .map_err(|e| SpeechError::Load(format!("failed to set thread count: {e}")))?
            .commit_from_file(&self.model_path)
            .map_err(|e| SpeechError::Load(format!("failed to load ONNX model: {e}")))?;
        *self.session.lock().unwrap() = Some(session);

        info!("Initializing misaki-rs phonemizer...");
        let phonemizer = misaki_rs::G2P::new(misaki_rs::Language::EnglishUS);
        self.phonemizer = Some(phonemizer);

        let stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| SpeechError::Output(format!("failed to open audio output: {e}")))?;
        self.output_stream = Some(stream);

        let load_ms = t0.elapsed().as_millis();
        info!("Kokoro voice '{}' loaded in {load_ms}ms", self.voice);

        Ok(())
    }

    /// Synthesize audio samples for a single line.
    fn synthesize(&self, line: &str) -> Result<Vec<f32>, SpeechError> {
        let mut session_guard = self.session.lock().unwrap();
        let session = session_guard.as_mut().ok_or(SpeechError::NotLoaded)?;
        let phonemizer = self.phonemizer.as_ref().ok_or(SpeechError::NotLoaded)?;
        let style = self.style.as_ref().ok_or(SpeechError::NotLoaded)?;

        let (phonemes, _tokens) = phonemizer
            .g2p(line)
            .map_err(|e| SpeechError::Synthesis(format!("phonemization failed: {e}")))?;

        if phonemes.is_empty() {
            return Ok(Vec::new());
        }

        let token_ids = phonemes_to_tokens(&self.vocab, &phonemes);
        let n_tokens = token_ids.len();

        // Index into the style array by token count (clamped to max)
        let style_idx = n_tokens.saturating_sub(2).min(style.styles.nrows() - 1);
        let style_vec: Vec<f32> = style.styles.row(style_idx).to_vec();

        let tokens_array = ndarray::Array2::from_shape_vec((1, n_tokens), token_ids)
            .map_err(|e| SpeechError::Synthesis(format!("failed to create tokens tensor: {e}")))?;
        let tokens_tensor = Tensor::from_array(tokens_array)
            .map_err(|e| SpeechError::Synthesis(format!("failed to create tokens ort tensor: {e}")))?;

        let style_array = ndarray::Array2::from_shape_vec((1, 256), style_vec)
            .map_err(|e| SpeechError::Synthesis(format!("failed to create style tensor: {e}")))?;
        let style_tensor = Tensor::from_array(style_array)
            .map_err(|e| SpeechError::Synthesis(format!("failed to create style ort tensor: {e}")))?;

        let speed_array = ndarray::Array1::from_vec(vec![self.speed]);
        let speed_tensor = Tensor::from_array(speed_array)
            .map_err(|e| SpeechError::Synthesis(format!("failed to create speed ort tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![
                "tokens" => tokens_tensor,
                "style" => style_tensor,
                "speed" => speed_tensor
            ])
            .map_err(|e| SpeechError::Synthesis(format!("ONNX inference failed: {e}")))?;

        // ort 2.0: try_extract_tensor returns a (&Shape, &[T]) tuple
        let first_output = outputs
            .iter()
            .next()
            .ok_or_else(|| SpeechError::Synthesis("no output tensor from model".into()))?;

        let (_shape, audio_slice) = first_output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| SpeechError::Synthesis(format!("failed to extract audio tensor: {e}")))?;

        let samples: Vec<f32> = audio_slice.iter().copied().collect();
        debug!(
            "Synthesized {} samples ({:.1}s)",
            samples.len(),
            samples.len() as f32 / SAMPLE_RATE as f32
        );

        Ok(samples)
    }

    /// Play samples through rodio. Returns true if cancelled during playback.
    async fn play_samples(&self, samples: Vec<f32>) -> Result<bool, SpeechError> {
        let stream = self
            .output_stream
            .as_ref()
            .ok_or_else(|| SpeechError::Output("no audio output stream".into()))?;

        // rodio 0.21: Sink::connect_new takes &Mixer
        let sink = Sink::connect_new(stream.mixer());
        let source = SamplesBuffer::new(1, SAMPLE_RATE, samples);
        sink.append(source);

        *self.active_sink.lock().unwrap() = Some(sink);

        let cancelled = self.cancelled.clone();
        let active_sink = self.active_sink.clone();

        let was_cancelled = tokio::task::spawn_blocking(move || {
            loop {
                let is_empty = {
                    let guard = active_sink.lock().unwrap();
                    match guard.as_ref() {
                        Some(s) => s.empty(),
                        None => true,
                    }
                };

                if is_empty {
                    return false;
                }

                if cancelled.load(Ordering::Relaxed) {
                    if let Some(sink) = active_sink.lock().unwrap().take() {
                        sink.stop();
                    }
                    return true;
                }

                std::thread::sleep(std::time::Duration::from_millis(50));
            }
        })
        .await
        .unwrap_or(false);

        *self.active_sink.lock().unwrap() = None;

        Ok(was_cancelled)
    }
}

#[async_trait]
impl SpeechSynth for KokoroVoice {
    fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }

    async fn speak_line(&self, line: &str) -> Result<UtteranceOutcome, SpeechError> {
        let _guard = self.line_lock.lock().await;
        if self.cancelled.load(Ordering::Relaxed) {
            return Ok(UtteranceOutcome::Cancelled);
        }

        let t_gen = Instant::now();
        let samples = self.synthesize(line)?;
        let gen_ms = t_gen.elapsed().as_secs_f64() * 1000.0;

        if self.cancelled.load(Ordering::Relaxed) {
            return Ok(UtteranceOutcome::Cancelled);
        }

        if samples.is_empty() {
            warn!("Line produced no audio: {line}");
            return Ok(UtteranceOutcome::Completed);
        }

        let t_play = Instant::now();
        let was_cancelled = self.play_samples(samples).await?;
        debug!(
            "Line done: gen={gen_ms:.0}ms play={:.0}ms",
            t_play.elapsed().as_secs_f64() * 1000.0
        );

        Ok(if was_cancelled {
            UtteranceOutcome::Cancelled
        } else {
            UtteranceOutcome::Completed
        })
    }

    fn cancel_all(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        if let Some(sink) = self.active_sink.lock().unwrap().take() {
            sink.stop();
        }
        debug!("Speech cancelled");
    }
}

// --- Helper functions ---

/// Parse the tokenizer vocabulary out of tokenizer.json contents.
fn parse_vocab(contents: &str) -> Result<HashMap<char, i64>, SpeechError> {
    let data: serde_json::Value = serde_json::from_str(contents)
        .map_err(|e| SpeechError::Load(format!("failed to parse tokenizer JSON: {e}")))?;

    let vocab = data["model"]["vocab"]
        .as_object()
        .ok_or_else(|| SpeechError::Load("missing model.vocab in tokenizer.json".into()))?;

    let mut map = HashMap::new();
    for (token, id) in vocab {
        let id = id
            .as_i64()
            .ok_or_else(|| SpeechError::Load("token ID is not an integer".into()))?;
        // Each token should be a single character
        if let Some(ch) = token.chars().next() {
            map.insert(ch, id);
        }
    }

    Ok(map)
}

/// Map phonemes to padded token IDs, truncated to the model's limit.
/// Unknown characters are skipped.
fn phonemes_to_tokens(vocab: &HashMap<char, i64>, phonemes: &str) -> Vec<i64> {
    let mut token_ids: Vec<i64> = Vec::with_capacity(phonemes.len() + 2);
    token_ids.push(0); // Start padding
    for ch in phonemes.chars() {
        if let Some(&id) = vocab.get(&ch) {
            token_ids.push(id);
        }
    }
    token_ids.push(0); // End padding
    token_ids.truncate(MAX_TOKENS);
    token_ids
}

/// Load one voice's style array from the NPZ voices file.
fn load_voice_style(path: &Path, voice: &str) -> Result<VoiceStyle, SpeechError> {
    let file = fs::File::open(path)
        .map_err(|e| SpeechError::Load(format!("failed to open voices file: {e}")))?;

    let mut npz = NpzReader::new(file)
        .map_err(|e| SpeechError::Load(format!("failed to read NPZ voices file: {e}")))?;

    let names: Vec<String> = npz
        .names()
        .map_err(|e| SpeechError::Load(format!("failed to list NPZ entries: {e}")))?
        .into_iter()
        .map(|n| n.trim_end_matches(".npy").to_string())
        .collect();

    if !names.iter().any(|n| n == voice) {
        return Err(SpeechError::Load(format!(
            "voice '{voice}' not found, available: {}",
            names.join(", ")
        )));
    }

    let arr: Array3<f32> = npz
        .by_name(&format!("{voice}.npy"))
        .map_err(|e| SpeechError::Load(format!("failed to read voice '{voice}': {e}")))?;

    // Shape is (510, 1, 256). Squeeze the middle dimension to (510, 256).
    let dim0 = arr.shape()[0];
    let dim2 = arr.shape()[2];
    let styles = arr
        .into_shape_with_order((dim0, dim2))
        .map_err(|e| SpeechError::Load(format!("failed to reshape voice '{voice}': {e}")))?;

    Ok(VoiceStyle { styles })
}
