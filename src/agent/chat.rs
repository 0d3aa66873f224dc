//! Chat completion backend speaking the OpenAI streaming protocol

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::agent::{ChatMessage, FragmentStream, ResponseGenerator};
use crate::config::LlmConfig;
use crate::{Error, Result};

/// Streaming chat completion client.
pub struct ChatGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatGenerator {
    #[must_use]
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl ResponseGenerator for ChatGenerator {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<FragmentStream> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
        };

        tracing::debug!(model = %self.model, messages = messages.len(), "requesting chat completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Agent(format!(
                "chat completion error: {status} - {body}"
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(pump_sse(response, tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Forward completion fragments from the response body.
///
/// The body is buffered and split on newlines before UTF-8 decoding, so a
/// multi-byte character falling across a chunk boundary never corrupts a
/// fragment.
async fn pump_sse(response: reqwest::Response, tx: mpsc::Sender<Result<String>>) {
    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = tx.send(Err(e.into())).await;
                return;
            }
        };
        buffer.extend_from_slice(&chunk);

        while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            match parse_sse_line(line.trim()) {
                SseLine::Fragment(text) => {
                    if tx.send(Ok(text)).await.is_err() {
                        return;
                    }
                }
                SseLine::Done => return,
                SseLine::Skip => {}
            }
        }
    }
}

enum SseLine {
    Fragment(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(payload) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => {
            let text: String = chunk
                .choices
                .into_iter()
                .filter_map(|choice| choice.delta.content)
                .collect();
            if text.is_empty() {
                SseLine::Skip
            } else {
                SseLine::Fragment(text)
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, line = %payload, "skipping unparseable stream chunk");
            SseLine::Skip
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}
