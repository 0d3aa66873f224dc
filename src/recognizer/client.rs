//! Duplex streaming client for the speech recognition service
//!
//! Audio frames go out as little-endian PCM16 binary messages; transcript
//! updates come back as JSON text messages carrying the cumulative text of
//! the current utterance and a segment index. A segment closes when the
//! service hands out a strictly larger index than any seen before in the
//! session.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audio::FrameConsumer;
use crate::{Error, Result};

/// How long the send loop waits for a frame before re-checking cancellation
const FRAME_RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// One transcription update from the recognition service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionEvent {
    /// Cumulative transcript of the current utterance
    pub text: String,
    /// Segment index assigned by the service
    pub segment_index: u64,
    /// Whether this update closed a recognition segment
    pub is_final: bool,
}

/// Receives transcription events from an active session.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn on_event(&self, event: RecognitionEvent);
}

/// Lifecycle of a recognition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Streaming,
    Stopping,
}

/// Tracks the highest segment index seen within one session.
///
/// Indexes start below any real segment, so the first update of a session
/// is partial until the service advances the index.
#[derive(Debug, Default)]
pub struct SegmentTracker {
    last_index: u64,
}

impl SegmentTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe a segment index; returns whether it closed a segment.
    pub fn observe(&mut self, index: u64) -> bool {
        let closed = index > self.last_index;
        if closed {
            self.last_index = index;
        }
        closed
    }
}

/// Transcript message on the wire.
#[derive(Debug, Deserialize)]
struct TranscriptMessage {
    text: String,
    idx: u64,
}

struct Session {
    id: Uuid,
    cancel: CancellationToken,
    send_task: JoinHandle<()>,
    recv_task: JoinHandle<()>,
}

/// WebSocket client streaming microphone frames to the recognition
/// service while transcript updates flow back concurrently.
pub struct SpeechRecognizerClient {
    endpoint: String,
    state: Arc<Mutex<SessionState>>,
    session: tokio::sync::Mutex<Option<Session>>,
}

impl SpeechRecognizerClient {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            state: Arc::new(Mutex::new(SessionState::Disconnected)),
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .map_or(SessionState::Disconnected, |state| *state)
    }

    /// Open a session: connect, then stream `frames` out while routing
    /// transcript updates into `sink` until stopped.
    ///
    /// A start while a session is already active is ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the WebSocket connection cannot be established;
    /// the client is left disconnected and a later start may retry.
    pub async fn start_session(
        &self,
        frames: FrameConsumer,
        sink: Arc<dyn TranscriptSink>,
    ) -> Result<()> {
        let mut slot = self.session.lock().await;

        {
            let Ok(mut state) = self.state.lock() else {
                return Err(Error::Recognizer("session state lock poisoned".into()));
            };
            if *state != SessionState::Disconnected {
                tracing::debug!(state = ?*state, "recognition session already active, ignoring start");
                return Ok(());
            }
            *state = SessionState::Connecting;
        }

        let stream = match tokio_tungstenite::connect_async(self.endpoint.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                if let Ok(mut state) = self.state.lock() {
                    *state = SessionState::Disconnected;
                }
                return Err(e.into());
            }
        };

        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (sender, receiver) = stream.split();

        tracing::info!(
            session_id = %session_id,
            endpoint = %self.endpoint,
            consumer = frames.label(),
            "recognition session connected"
        );

        let send_task = tokio::spawn(send_loop(sender, frames, cancel.clone(), session_id));
        let recv_task = tokio::spawn(recv_loop(
            receiver,
            sink,
            cancel.clone(),
            Arc::clone(&self.state),
            session_id,
        ));

        if let Ok(mut state) = self.state.lock() {
            *state = SessionState::Streaming;
        }
        *slot = Some(Session {
            id: session_id,
            cancel,
            send_task,
            recv_task,
        });
        Ok(())
    }

    /// Tear down the active session.
    ///
    /// Every cleanup step runs even when an earlier one fails, so the
    /// client always ends disconnected and ready for the next session.
    /// A stop with no active session is a no-op.
    pub async fn stop_session(&self) {
        let session = {
            let mut slot = self.session.lock().await;
            slot.take()
        };
        let Some(session) = session else {
            tracing::trace!("no active recognition session to stop");
            return;
        };

        if let Ok(mut state) = self.state.lock() {
            *state = SessionState::Stopping;
        }
        session.cancel.cancel();

        for (name, task) in [("send", session.send_task), ("recv", session.recv_task)] {
            if let Err(e) = task.await {
                tracing::warn!(
                    session_id = %session.id,
                    task = name,
                    error = %e,
                    "recognizer task join failed"
                );
            }
        }

        if let Ok(mut state) = self.state.lock() {
            *state = SessionState::Disconnected;
        }
        tracing::debug!(session_id = %session.id, "recognition session stopped");
    }
}

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;

type WsStream = futures::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

/// Pump audio frames out as binary PCM16 until cancelled.
async fn send_loop(
    mut sender: WsSink,
    frames: FrameConsumer,
    cancel: CancellationToken,
    session_id: Uuid,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            frame = frames.recv(FRAME_RECV_TIMEOUT) => {
                let Some(frame) = frame else { continue };
                if frame.is_empty() {
                    continue;
                }
                if let Err(e) = sender.send(WsMessage::Binary(frame.pcm16_bytes().into())).await {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %e,
                        "audio send failed, closing session"
                    );
                    break;
                }
            }
        }
    }

    let _ = sender.send(WsMessage::Close(None)).await;
    let _ = sender.close().await;
    tracing::debug!(session_id = %session_id, "recognizer send loop terminated");
}

/// Route transcript updates into the sink until the socket closes or the
/// session is cancelled. Malformed messages are logged and skipped; they
/// never surface as events.
async fn recv_loop(
    mut receiver: WsStream,
    sink: Arc<dyn TranscriptSink>,
    cancel: CancellationToken,
    state: Arc<Mutex<SessionState>>,
    session_id: Uuid,
) {
    let mut tracker = SegmentTracker::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            message = receiver.next() => {
                match message {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<TranscriptMessage>(text.as_str()) {
                            Ok(update) => {
                                let is_final = tracker.observe(update.idx);
                                tracing::debug!(
                                    session_id = %session_id,
                                    idx = update.idx,
                                    is_final,
                                    text = %update.text,
                                    "transcript update"
                                );
                                sink.on_event(RecognitionEvent {
                                    text: update.text,
                                    segment_index: update.idx,
                                    is_final,
                                })
                                .await;
                            }
                            Err(e) => {
                                tracing::warn!(
                                    session_id = %session_id,
                                    error = %e,
                                    "malformed transcript message"
                                );
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        tracing::info!(
                            session_id = %session_id,
                            frame = ?frame,
                            "recognition service closed the connection"
                        );
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(
                            session_id = %session_id,
                            error = %e,
                            "recognition socket error"
                        );
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    // A socket that died on its own still leaves the client restartable.
    cancel.cancel();
    if let Ok(mut state) = state.lock() {
        *state = SessionState::Disconnected;
    }
    tracing::debug!(session_id = %session_id, "recognizer receive loop terminated");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_segment_index_is_not_final() {
        let mut tracker = SegmentTracker::new();
        assert!(!tracker.observe(0));
        assert!(!tracker.observe(0));
    }

    #[test]
    fn advancing_index_closes_a_segment_once() {
        let mut tracker = SegmentTracker::new();
        assert!(!tracker.observe(0));
        assert!(tracker.observe(1));
        assert!(!tracker.observe(1));
        assert!(tracker.observe(2));
    }

    #[test]
    fn stale_index_never_closes_a_segment() {
        let mut tracker = SegmentTracker::new();
        assert!(tracker.observe(5));
        assert!(!tracker.observe(3));
        assert!(!tracker.observe(5));
        assert!(tracker.observe(6));
    }

    #[test]
    fn transcript_message_parses_service_payload() {
        let update: TranscriptMessage =
            serde_json::from_str(r#"{"text": "杭州天气怎么样", "idx": 2}"#).unwrap();
        assert_eq!(update.text, "杭州天气怎么样");
        assert_eq!(update.idx, 2);
    }

    #[test]
    fn malformed_payload_fails_to_parse() {
        assert!(serde_json::from_str::<TranscriptMessage>(r#"{"words": "hi"}"#).is_err());
        assert!(serde_json::from_str::<TranscriptMessage>("not json").is_err());
    }
}
