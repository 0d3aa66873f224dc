//! Configuration management for the Halo agent

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::keyword::{SpotterAssets, DEFAULT_BOOST_SCORE, DEFAULT_THRESHOLD};
use crate::{Error, Result};

/// Default WebSocket endpoint of the recognition service
const DEFAULT_RECOGNIZER_ENDPOINT: &str = "ws://localhost:8000/sttRealtime";

/// Default HTTP endpoint of the synthesis service
const DEFAULT_SYNTHESIS_ENDPOINT: &str = "http://localhost:8001/tts";

/// Default synthesis voice character
const DEFAULT_CHARACTER: &str = "linzhiling";

/// Default chat completion API base URL
const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat completion model
const DEFAULT_LLM_MODEL: &str = "gpt-3.5-turbo";

/// Default keyword model bundle directory
const DEFAULT_KEYWORD_DIR: &str = "assets/keyword";

/// Default acknowledgment cue
const DEFAULT_ACK_CUE: &str = "assets/media/click.mp3";

/// Default error cue
const DEFAULT_ERROR_CUE: &str = "assets/media/error.mp3";

/// System prompt tuned for spoken answers
const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly voice assistant. Keep answers short, \
    conversational, and easy to follow when read aloud. Prefer complete sentences over lists.";

/// Halo agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Audio capture configuration
    pub audio: AudioConfig,

    /// Keyword spotter configuration
    pub keyword: KeywordConfig,

    /// Speech recognition configuration
    pub recognizer: RecognizerConfig,

    /// LLM configuration
    pub llm: LlmConfig,

    /// Speech synthesis configuration
    pub synthesis: SynthesisConfig,

    /// Feedback cue configuration
    pub cues: CueConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Default)]
pub struct AudioConfig {
    /// Preferred input device name; `None` selects the default device
    pub input_device: Option<String>,
}

/// Keyword spotter configuration
#[derive(Debug, Clone)]
pub struct KeywordConfig {
    /// Directory holding the spotter model bundle
    pub asset_dir: PathBuf,

    /// Boost applied to keyword token paths during decoding
    pub boost_score: f32,

    /// Acceptance threshold for keyword candidates
    pub threshold: f32,
}

impl KeywordConfig {
    /// Resolve the asset bundle under the configured directory.
    #[must_use]
    pub fn assets(&self) -> SpotterAssets {
        let mut assets = SpotterAssets::from_dir(&self.asset_dir);
        assets.boost_score = self.boost_score;
        assets.threshold = self.threshold;
        assets
    }
}

/// Speech recognition configuration
#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// WebSocket endpoint of the recognition service
    pub endpoint: String,

    /// Silence that finalizes an utterance, in milliseconds
    pub silence_timeout_ms: u64,

    /// Minimum utterance length worth answering, in characters
    pub min_question_length: usize,
}

impl RecognizerConfig {
    /// Silence timeout as a [`Duration`].
    #[must_use]
    pub const fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }
}

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key (from `LLM_API_KEY` env)
    pub api_key: String,

    /// Chat completion API base URL
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// System prompt pinned to every conversation
    pub system_prompt: String,
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// HTTP endpoint of the synthesis service
    pub endpoint: String,

    /// Synthesis voice character
    pub character: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Feedback cue configuration
#[derive(Debug, Clone)]
pub struct CueConfig {
    /// Played when the keyword is detected and listening begins
    pub ack: PathBuf,

    /// Played when an interaction cycle fails
    pub error: PathBuf,
}

impl Config {
    /// Load configuration with priority: env > config file > default.
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();

        let audio = AudioConfig {
            input_device: std::env::var("HALO_INPUT_DEVICE")
                .ok()
                .or(fc.audio.input_device),
        };

        let keyword = KeywordConfig {
            asset_dir: std::env::var("HALO_KEYWORD_ASSETS")
                .ok()
                .or(fc.keyword.asset_dir)
                .map_or_else(|| PathBuf::from(DEFAULT_KEYWORD_DIR), PathBuf::from),
            boost_score: fc.keyword.boost_score.unwrap_or(DEFAULT_BOOST_SCORE),
            threshold: fc.keyword.threshold.unwrap_or(DEFAULT_THRESHOLD),
        };

        let recognizer = RecognizerConfig {
            endpoint: std::env::var("HALO_RECOGNIZER_URL")
                .ok()
                .or(fc.recognizer.endpoint)
                .unwrap_or_else(|| DEFAULT_RECOGNIZER_ENDPOINT.to_string()),
            silence_timeout_ms: fc.recognizer.silence_timeout_ms.unwrap_or(1500),
            min_question_length: fc.recognizer.min_question_length.unwrap_or(3),
        };

        let llm = LlmConfig {
            api_key: std::env::var("LLM_API_KEY")
                .ok()
                .or(fc.llm.api_key)
                .unwrap_or_default(),
            base_url: std::env::var("LLM_BASE_URL")
                .ok()
                .or(fc.llm.base_url)
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            model: std::env::var("LLM_MODEL")
                .ok()
                .or(fc.llm.model)
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            system_prompt: fc
                .llm
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        };

        let synthesis = SynthesisConfig {
            endpoint: std::env::var("HALO_SYNTH_URL")
                .ok()
                .or(fc.synthesis.endpoint)
                .unwrap_or_else(|| DEFAULT_SYNTHESIS_ENDPOINT.to_string()),
            character: std::env::var("HALO_SYNTH_CHARACTER")
                .ok()
                .or(fc.synthesis.character)
                .unwrap_or_else(|| DEFAULT_CHARACTER.to_string()),
            timeout_secs: fc.synthesis.timeout_secs.unwrap_or(10),
        };

        let cues = CueConfig {
            ack: fc
                .cues
                .ack
                .map_or_else(|| PathBuf::from(DEFAULT_ACK_CUE), PathBuf::from),
            error: fc
                .cues
                .error
                .map_or_else(|| PathBuf::from(DEFAULT_ERROR_CUE), PathBuf::from),
        };

        Self {
            audio,
            keyword,
            recognizer,
            llm,
            synthesis,
            cues,
        }
    }

    /// Check startup requirements.
    ///
    /// # Errors
    ///
    /// Returns error if the keyword model bundle is incomplete or an
    /// endpoint URL is malformed.
    pub fn validate(&self) -> Result<()> {
        self.keyword.assets().validate()?;

        let recognizer = url::Url::parse(&self.recognizer.endpoint)
            .map_err(|e| Error::Config(format!("invalid recognizer endpoint: {e}")))?;
        if !matches!(recognizer.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "recognizer endpoint must be ws:// or wss://, got {}",
                recognizer.scheme()
            )));
        }

        let synthesis = url::Url::parse(&self.synthesis.endpoint)
            .map_err(|e| Error::Config(format!("invalid synthesis endpoint: {e}")))?;
        if !matches!(synthesis.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "synthesis endpoint must be http:// or https://, got {}",
                synthesis.scheme()
            )));
        }

        url::Url::parse(&self.llm.base_url)
            .map_err(|e| Error::Config(format!("invalid llm base url: {e}")))?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            keyword: KeywordConfig {
                asset_dir: PathBuf::from(DEFAULT_KEYWORD_DIR),
                boost_score: DEFAULT_BOOST_SCORE,
                threshold: DEFAULT_THRESHOLD,
            },
            recognizer: RecognizerConfig {
                endpoint: DEFAULT_RECOGNIZER_ENDPOINT.to_string(),
                silence_timeout_ms: 1500,
                min_question_length: 3,
            },
            llm: LlmConfig {
                api_key: String::new(),
                base_url: DEFAULT_LLM_BASE_URL.to_string(),
                model: DEFAULT_LLM_MODEL.to_string(),
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            },
            synthesis: SynthesisConfig {
                endpoint: DEFAULT_SYNTHESIS_ENDPOINT.to_string(),
                character: DEFAULT_CHARACTER.to_string(),
                timeout_secs: 10,
            },
            cues: CueConfig {
                ack: PathBuf::from(DEFAULT_ACK_CUE),
                error: PathBuf::from(DEFAULT_ERROR_CUE),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_local_services() {
        let config = Config::default();
        assert_eq!(config.recognizer.endpoint, "ws://localhost:8000/sttRealtime");
        assert_eq!(config.synthesis.endpoint, "http://localhost:8001/tts");
        assert_eq!(config.synthesis.character, "linzhiling");
        assert_eq!(config.recognizer.silence_timeout(), Duration::from_millis(1500));
        assert_eq!(config.recognizer.min_question_length, 3);
    }

    #[test]
    fn validate_rejects_non_websocket_recognizer_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "tokens.txt",
            "encoder.onnx",
            "decoder.onnx",
            "joiner.onnx",
            "keywords.txt",
        ] {
            std::fs::write(dir.path().join(name), b"stub").unwrap();
        }

        let mut config = Config {
            keyword: KeywordConfig {
                asset_dir: dir.path().to_path_buf(),
                boost_score: DEFAULT_BOOST_SCORE,
                threshold: DEFAULT_THRESHOLD,
            },
            ..Config::default()
        };
        config.recognizer.endpoint = "http://localhost:8000/sttRealtime".to_string();

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("ws://"), "unexpected error: {err}");
    }

    #[test]
    fn validate_requires_the_model_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            keyword: KeywordConfig {
                asset_dir: dir.path().to_path_buf(),
                boost_score: DEFAULT_BOOST_SCORE,
                threshold: DEFAULT_THRESHOLD,
            },
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_passes_with_complete_bundle() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "tokens.txt",
            "encoder.onnx",
            "decoder.onnx",
            "joiner.onnx",
            "keywords.txt",
        ] {
            std::fs::write(dir.path().join(name), b"stub").unwrap();
        }

        let config = Config {
            keyword: KeywordConfig {
                asset_dir: dir.path().to_path_buf(),
                boost_score: DEFAULT_BOOST_SCORE,
                threshold: DEFAULT_THRESHOLD,
            },
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }
}
