//! Speech synthesis client

use std::time::Duration;

use crate::config::SynthesisConfig;
use crate::{Error, Result};

/// Synthesizes speech from text via the synthesis service.
pub struct SpeechSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    character: String,
}

impl SpeechSynthesizer {
    /// Create a synthesizer from config.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            character: config.character.clone(),
        })
    }

    /// Synthesize one sentence.
    ///
    /// # Returns
    ///
    /// Encoded audio bytes (WAV or MP3, decided by the service).
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, times out, or the service
    /// responds with a non-success status.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct SynthesisRequest<'a> {
            text: &'a str,
            character: &'a str,
        }

        let request = SynthesisRequest {
            text,
            character: &self.character,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!(
                "synthesis service error {status}: {body}"
            )));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}
