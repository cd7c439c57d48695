//! Configuration management for rap-booth-rs.
//!
//! Loads config from YAML files in standard locations. Every section has
//! defaults, so the service runs without any config file present.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Base URL of the lyrics-generation service.
    pub host: String,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            host: "http://127.0.0.1:3000".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub voice: String,
    pub speed: f32,
    pub model_path: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            voice: "am_michael".into(),
            speed: 1.3,
            model_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BeatConfig {
    /// Audio file played under the spoken lines.
    pub path: String,
    pub volume: f32,
    /// Gain applied while lines are being spoken.
    pub duck_volume: f32,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            path: "beat.mp3".into(),
            volume: 0.3,
            duck_volume: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Watchdog: abort the sequence if a single line takes longer than this.
    pub utterance_timeout_secs: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            utterance_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8768 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub speech: SpeechConfig,
    pub beat: BeatConfig,
    pub playback: PlaybackConfig,
    pub api: ApiConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/rap-booth/config.yaml
    /// 3. /etc/rap-booth/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/rap-booth/config.yaml")),
                Some(PathBuf::from("/etc/rap-booth/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match serde_yml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.speech.speed, 1.3);
        assert_eq!(config.beat.volume, 0.3);
        assert!(config.beat.duck_volume < config.beat.volume);
        assert_eq!(config.api.port, 8768);
    }

    #[test]
    fn partial_yaml_fills_remaining_sections_with_defaults() {
        let yaml = "generation:\n  host: http://10.0.0.5:3000\nbeat:\n  volume: 0.5\n";
        let config: Config = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.generation.host, "http://10.0.0.5:3000");
        assert_eq!(config.generation.timeout_secs, 30);
        assert_eq!(config.beat.volume, 0.5);
        assert_eq!(config.beat.path, "beat.mp3");
        assert_eq!(config.playback.utterance_timeout_secs, 30);
    }
}
