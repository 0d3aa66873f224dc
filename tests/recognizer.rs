//! Recognition pipeline integration tests
//!
//! Drives the utterance collector with synthetic transcript events and
//! exercises the recognizer client lifecycle without a live service.

use halo_agent::audio::AudioDistributor;
use halo_agent::recognizer::{
    QuestionSink, RecognitionEvent, SessionState, SpeechRecognizerClient, TranscriptSink,
    UtteranceCollector,
};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Forwards finalized questions into a channel for assertions
struct QuestionProbe {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl QuestionSink for QuestionProbe {
    async fn on_question(&self, text: String) {
        let _ = self.tx.send(text);
    }
}

/// Transcript sink that ignores everything
struct NullTranscript;

#[async_trait]
impl TranscriptSink for NullTranscript {
    async fn on_event(&self, _event: RecognitionEvent) {}
}

fn collector_with_probe(
    silence_timeout: Duration,
    min_length: usize,
) -> (UtteranceCollector, mpsc::UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = Arc::new(QuestionProbe { tx });
    let collector = UtteranceCollector::spawn(silence_timeout, min_length, sink);
    (collector, rx)
}

fn update(text: &str, segment_index: u64, is_final: bool) -> RecognitionEvent {
    RecognitionEvent {
        text: text.to_string(),
        segment_index,
        is_final,
    }
}

async fn expect_question(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a finalized question")
        .expect("collector hung up")
}

#[tokio::test]
async fn test_closing_segment_finalizes_immediately() {
    // Long silence timeout so only the closing segment can finalize.
    let (collector, mut rx) = collector_with_probe(Duration::from_secs(10), 3);

    collector.on_event(update("杭州", 1, false)).await;
    collector.on_event(update("杭州天气", 1, false)).await;
    collector.on_event(update("杭州天气怎么样", 2, true)).await;

    assert_eq!(expect_question(&mut rx).await, "杭州天气怎么样");
}

#[tokio::test]
async fn test_updates_replace_previous_text() {
    let (collector, mut rx) = collector_with_probe(Duration::from_secs(10), 3);

    collector.on_event(update("What", 1, false)).await;
    collector.on_event(update("What time", 1, false)).await;
    collector.on_event(update("What time is it", 2, true)).await;

    // Cumulative updates must not be concatenated.
    assert_eq!(expect_question(&mut rx).await, "What time is it");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_silence_finalizes_pending_utterance() {
    let (collector, mut rx) = collector_with_probe(Duration::from_millis(100), 3);

    collector.on_event(update("今天天气怎么样", 1, false)).await;

    assert_eq!(expect_question(&mut rx).await, "今天天气怎么样");
}

#[tokio::test]
async fn test_short_utterance_waits_for_more_speech() {
    let (collector, mut rx) = collector_with_probe(Duration::from_millis(80), 3);

    collector.on_event(update("嗯", 1, false)).await;
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(rx.try_recv().is_err());

    collector.on_event(update("嗯今天呢", 1, false)).await;
    assert_eq!(expect_question(&mut rx).await, "嗯今天呢");
}

#[tokio::test]
async fn test_utterance_finalizes_once() {
    let (collector, mut rx) = collector_with_probe(Duration::from_millis(100), 3);

    collector.on_event(update("现在几点了", 1, true)).await;
    assert_eq!(expect_question(&mut rx).await, "现在几点了");

    // The silence timer was cleared by the finalization.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_reset_discards_pending_utterance() {
    let (collector, mut rx) = collector_with_probe(Duration::from_millis(100), 3);

    collector.on_event(update("别说了别说了", 1, false)).await;
    collector.reset().await;
    collector.reset().await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_empty_update_is_ignored() {
    let (collector, mut rx) = collector_with_probe(Duration::from_millis(80), 3);

    collector.on_event(update("", 1, false)).await;

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_client_starts_disconnected() {
    let client = SpeechRecognizerClient::new("ws://localhost:8000/sttRealtime");
    assert_eq!(client.state(), SessionState::Disconnected);

    // Stopping without a session is a no-op.
    client.stop_session().await;
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_connect_failure_leaves_client_restartable() {
    // Discard port; nothing listens there, so the connect is refused.
    let client = SpeechRecognizerClient::new("ws://127.0.0.1:9/sttRealtime");
    let distributor = Arc::new(AudioDistributor::new());

    let frames = distributor.register("recognizer");
    let result = client.start_session(frames, Arc::new(NullTranscript)).await;

    assert!(result.is_err());
    assert_eq!(client.state(), SessionState::Disconnected);

    // A failed connect must not wedge the client in a busy state.
    let frames = distributor.register("recognizer");
    let result = client.start_session(frames, Arc::new(NullTranscript)).await;
    assert!(result.is_err());
    assert_eq!(client.state(), SessionState::Disconnected);
}
