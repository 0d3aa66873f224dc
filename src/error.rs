//! Error types for the halo agent.

use thiserror::Error;

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the halo agent.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio capture/playback errors
    #[error("audio error: {0}")]
    Audio(String),

    /// Keyword spotting errors
    #[error("keyword error: {0}")]
    Keyword(String),

    /// Streaming speech recognition errors
    #[error("recognizer error: {0}")]
    Recognizer(String),

    /// Response generation errors
    #[error("agent error: {0}")]
    Agent(String),

    /// Speech synthesis errors
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket errors
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
