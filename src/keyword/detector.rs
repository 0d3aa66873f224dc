//! Streaming keyword detection over the shared frame stream

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioFrame, FrameConsumer};
use crate::keyword::SpotterAssets;
use crate::{Error, Result};

/// How long to wait for a frame before re-checking cancellation
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Per-frame RMS above this counts as speech
const SPEECH_RMS_THRESHOLD: f32 = 0.03;

/// Sustained speech frames required before a candidate forms (300ms)
const MIN_SPEECH_FRAMES: usize = 3;

/// Trailing quiet frames that close a candidate (500ms)
const TRAILING_SILENCE_FRAMES: usize = 5;

/// Receives keyword hits from the detector.
#[async_trait]
pub trait KeywordSink: Send + Sync {
    async fn on_keyword(&self, keyword: &str);
}

/// Streaming-decode surface of a keyword model.
///
/// Mirrors the feed/ready/decode/result/reset cycle of streaming
/// transducer spotters so a neural implementation can drop in behind the
/// same detector loop.
pub trait KeywordStream: Send {
    /// Feed one frame of samples into the stream.
    fn accept_frame(&mut self, samples: &[f32]);

    /// Whether a decode step can run.
    fn is_ready(&self) -> bool;

    /// Advance decoding by one step.
    fn decode(&mut self);

    /// Take the detection produced by the last decode step, if any.
    fn result(&mut self) -> Option<String>;

    /// Clear decoding state for a fresh detection window.
    fn reset(&mut self);
}

/// Drives a [`KeywordStream`] over a consumer's frames and reports hits.
pub struct KeywordDetector {
    stream: Box<dyn KeywordStream>,
    sink: Arc<dyn KeywordSink>,
}

impl KeywordDetector {
    #[must_use]
    pub fn new(stream: Box<dyn KeywordStream>, sink: Arc<dyn KeywordSink>) -> Self {
        Self { stream, sink }
    }

    /// Consume frames until cancelled.
    pub async fn run(mut self, frames: FrameConsumer, cancel: CancellationToken) {
        tracing::debug!(consumer = frames.label(), "keyword detection started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                frame = frames.recv(RECV_TIMEOUT) => {
                    if let Some(frame) = frame {
                        self.process(&frame).await;
                    }
                }
            }
        }
        tracing::debug!("keyword detection stopped");
    }

    /// Feed one frame and drain every ready decode step.
    ///
    /// The sink call completes before the next decode step runs, so a hit
    /// is never reported twice for one utterance.
    async fn process(&mut self, frame: &AudioFrame) {
        self.stream.accept_frame(&frame.samples);
        while self.stream.is_ready() {
            self.stream.decode();
            if let Some(keyword) = self.stream.result() {
                tracing::info!(keyword = %keyword, "keyword detected");
                self.sink.on_keyword(&keyword).await;
                self.stream.reset();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvelopeState {
    Idle,
    Speech { run: usize },
    Trailing { quiet: usize },
}

/// Energy-envelope spotter.
///
/// Reports the configured keyword when a sustained burst of speech energy
/// is followed by silence. Stands in for a transducer model behind the
/// same [`KeywordStream`] interface; the reported label comes from the
/// bundle's keywords file.
pub struct EnergySpotter {
    label: String,
    state: EnvelopeState,
    pending: VecDeque<f32>,
    fired: Option<String>,
}

impl EnergySpotter {
    /// Build from a validated asset bundle.
    ///
    /// # Errors
    ///
    /// Returns error if the keywords file is unreadable or empty.
    pub fn from_assets(assets: &SpotterAssets) -> Result<Self> {
        let entries = assets.load_keywords()?;
        let primary = entries
            .first()
            .ok_or_else(|| Error::Keyword("keywords file is empty".into()))?;

        tracing::info!(
            keyword = %primary.label,
            boost = primary.boost,
            threshold = primary.threshold,
            entries = entries.len(),
            "keyword spotter loaded"
        );

        Ok(Self {
            label: primary.label.clone(),
            state: EnvelopeState::Idle,
            pending: VecDeque::new(),
            fired: None,
        })
    }

    /// Keyword label this spotter reports.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    fn step(&mut self, rms: f32) {
        let speech = rms > SPEECH_RMS_THRESHOLD;
        self.state = match self.state {
            EnvelopeState::Idle if speech => EnvelopeState::Speech { run: 1 },
            EnvelopeState::Idle => EnvelopeState::Idle,
            EnvelopeState::Speech { run } if speech => EnvelopeState::Speech { run: run + 1 },
            EnvelopeState::Speech { run } if run >= MIN_SPEECH_FRAMES => {
                EnvelopeState::Trailing { quiet: 1 }
            }
            // burst too short to be speech
            EnvelopeState::Speech { .. } => EnvelopeState::Idle,
            EnvelopeState::Trailing { .. } if speech => EnvelopeState::Speech {
                run: MIN_SPEECH_FRAMES,
            },
            EnvelopeState::Trailing { quiet } if quiet + 1 >= TRAILING_SILENCE_FRAMES => {
                self.fired = Some(self.label.clone());
                EnvelopeState::Idle
            }
            EnvelopeState::Trailing { quiet } => EnvelopeState::Trailing { quiet: quiet + 1 },
        };
    }
}

impl KeywordStream for EnergySpotter {
    fn accept_frame(&mut self, samples: &[f32]) {
        self.pending.push_back(frame_rms(samples));
    }

    fn is_ready(&self) -> bool {
        !self.pending.is_empty()
    }

    fn decode(&mut self) {
        if let Some(rms) = self.pending.pop_front() {
            self.step(rms);
        }
    }

    fn result(&mut self) -> Option<String> {
        self.fired.take()
    }

    fn reset(&mut self) {
        self.state = EnvelopeState::Idle;
        self.pending.clear();
        self.fired = None;
    }
}

#[allow(clippy::cast_precision_loss)]
fn frame_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}
