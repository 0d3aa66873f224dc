//! TOML configuration file loading
//!
//! Supports `~/.config/omni/halo/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct HaloConfigFile {
    /// Audio capture configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Keyword spotter configuration
    #[serde(default)]
    pub keyword: KeywordFileConfig,

    /// Speech recognition configuration
    #[serde(default)]
    pub recognizer: RecognizerFileConfig,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub synthesis: SynthesisFileConfig,

    /// Feedback cue configuration
    #[serde(default)]
    pub cues: CueFileConfig,
}

/// Audio capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Preferred input device name
    pub input_device: Option<String>,
}

/// Keyword spotter configuration
#[derive(Debug, Default, Deserialize)]
pub struct KeywordFileConfig {
    /// Directory holding the spotter model bundle
    pub asset_dir: Option<String>,

    /// Boost applied to keyword token paths
    pub boost_score: Option<f32>,

    /// Acceptance threshold for keyword candidates
    pub threshold: Option<f32>,
}

/// Speech recognition configuration
#[derive(Debug, Default, Deserialize)]
pub struct RecognizerFileConfig {
    /// WebSocket endpoint (e.g. `ws://localhost:8000/sttRealtime`)
    pub endpoint: Option<String>,

    /// Silence that finalizes an utterance, in milliseconds
    pub silence_timeout_ms: Option<u64>,

    /// Minimum utterance length worth answering, in characters
    pub min_question_length: Option<usize>,
}

/// LLM configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// API key
    pub api_key: Option<String>,

    /// Chat completion API base URL
    pub base_url: Option<String>,

    /// Model identifier (e.g. "gpt-3.5-turbo")
    pub model: Option<String>,

    /// System prompt pinned to every conversation
    pub system_prompt: Option<String>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisFileConfig {
    /// HTTP endpoint of the synthesis service
    pub endpoint: Option<String>,

    /// Synthesis voice character
    pub character: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Feedback cue configuration
#[derive(Debug, Default, Deserialize)]
pub struct CueFileConfig {
    /// Acknowledgment cue audio file
    pub ack: Option<String>,

    /// Error cue audio file
    pub error: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `HaloConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> HaloConfigFile {
    let Some(path) = config_file_path() else {
        return HaloConfigFile::default();
    };

    if !path.exists() {
        return HaloConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                HaloConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            HaloConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/omni/halo/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.config_dir().join("omni").join("halo").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses_with_defaults() {
        let content = r#"
            [recognizer]
            endpoint = "ws://stt.local:9000/realtime"

            [llm]
            model = "gpt-4o-mini"
        "#;
        let config: HaloConfigFile = toml::from_str(content).unwrap();
        assert_eq!(
            config.recognizer.endpoint.as_deref(),
            Some("ws://stt.local:9000/realtime")
        );
        assert!(config.recognizer.silence_timeout_ms.is_none());
        assert_eq!(config.llm.model.as_deref(), Some("gpt-4o-mini"));
        assert!(config.audio.input_device.is_none());
    }

    #[test]
    fn empty_file_parses_to_defaults() {
        let config: HaloConfigFile = toml::from_str("").unwrap();
        assert!(config.keyword.asset_dir.is_none());
        assert!(config.cues.ack.is_none());
    }
}
