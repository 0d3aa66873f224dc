//! Utterance finalization from streaming transcript updates

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::recognizer::{RecognitionEvent, TranscriptSink};

/// Receives finalized questions.
#[async_trait]
pub trait QuestionSink: Send + Sync {
    async fn on_question(&self, text: String);
}

enum CollectorCommand {
    Event(RecognitionEvent),
    Reset,
}

/// Collects streaming transcript updates into finalized utterances.
///
/// Runs as an actor task: transcript events, the silence timer, and
/// resets are serialized through one loop, so a closing segment and an
/// expiring timer can never finalize the same utterance twice.
pub struct UtteranceCollector {
    tx: mpsc::Sender<CollectorCommand>,
}

impl UtteranceCollector {
    /// Spawn the collector task.
    ///
    /// `silence_timeout` finalizes a pending utterance once updates stop
    /// arriving. Utterances shorter than `min_length` characters keep
    /// waiting for more speech instead of finalizing.
    #[must_use]
    pub fn spawn(
        silence_timeout: Duration,
        min_length: usize,
        sink: Arc<dyn QuestionSink>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(collect_loop(rx, silence_timeout, min_length, sink));
        Self { tx }
    }

    /// Discard any partially collected utterance and pending timer.
    pub async fn reset(&self) {
        let _ = self.tx.send(CollectorCommand::Reset).await;
    }
}

#[async_trait]
impl TranscriptSink for UtteranceCollector {
    async fn on_event(&self, event: RecognitionEvent) {
        let _ = self.tx.send(CollectorCommand::Event(event)).await;
    }
}

async fn collect_loop(
    mut rx: mpsc::Receiver<CollectorCommand>,
    silence_timeout: Duration,
    min_length: usize,
    sink: Arc<dyn QuestionSink>,
) {
    let mut text = String::new();
    let mut deadline: Option<tokio::time::Instant> = None;

    loop {
        tokio::select! {
            command = rx.recv() => {
                match command {
                    Some(CollectorCommand::Event(event)) => {
                        if event.text.is_empty() {
                            continue;
                        }
                        // Updates carry the cumulative utterance text, so
                        // each one replaces what was collected before.
                        text = event.text;
                        if event.is_final && text.chars().count() >= min_length {
                            finalize(&mut text, &mut deadline, &sink).await;
                        } else {
                            deadline = Some(tokio::time::Instant::now() + silence_timeout);
                        }
                    }
                    Some(CollectorCommand::Reset) => {
                        text.clear();
                        deadline = None;
                    }
                    None => break,
                }
            }
            () = tokio::time::sleep_until(deadline.unwrap_or_else(tokio::time::Instant::now)), if deadline.is_some() => {
                if text.chars().count() >= min_length {
                    finalize(&mut text, &mut deadline, &sink).await;
                } else {
                    // too short to stand alone, wait for more speech
                    deadline = None;
                }
            }
        }
    }
}

async fn finalize(
    text: &mut String,
    deadline: &mut Option<tokio::time::Instant>,
    sink: &Arc<dyn QuestionSink>,
) {
    *deadline = None;
    let question = std::mem::take(text).trim().to_string();
    if question.is_empty() {
        return;
    }
    tracing::info!(question = %question, "utterance finalized");
    sink.on_question(question).await;
}
