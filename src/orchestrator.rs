//! Conversation orchestration
//!
//! Sequences one interaction cycle: keyword, listening, response
//! generation, playback, back to waiting. Pipeline stages report through
//! sinks into a single event loop; phase guards make stale events no-ops
//! rather than races.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::{Conversation, FragmentStream, ResponseGenerator};
use crate::audio::{AudioDistributor, AudioPlaybackQueue, AudioSource};
use crate::config::Config;
use crate::keyword::{EnergySpotter, KeywordDetector, KeywordSink};
use crate::recognizer::{QuestionSink, SpeechRecognizerClient, TranscriptSink, UtteranceCollector};
use crate::synth::SpeechSynthesizer;
use crate::text::{SentencePoll, SentenceQueue};
use crate::Result;

/// How long the play loop waits for the next sentence
const SENTENCE_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Phases of one interaction cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Passive: only the keyword spotter is listening
    WaitingKeyword,
    /// Recognition session active, collecting the user's question
    ListeningQuestion,
    /// Question accepted, response generation starting
    ProcessingResponse,
    /// Response streaming through synthesis into playback
    PlayingResponse,
}

#[derive(Debug)]
enum PipelineEvent {
    Keyword(String),
    Question(String),
}

/// Forwards keyword hits into the orchestrator's event loop.
struct KeywordRelay {
    tx: mpsc::Sender<PipelineEvent>,
}

#[async_trait]
impl KeywordSink for KeywordRelay {
    async fn on_keyword(&self, keyword: &str) {
        let _ = self
            .tx
            .send(PipelineEvent::Keyword(keyword.to_string()))
            .await;
    }
}

/// Forwards finalized questions into the orchestrator's event loop.
struct QuestionRelay {
    tx: mpsc::Sender<PipelineEvent>,
}

#[async_trait]
impl QuestionSink for QuestionRelay {
    async fn on_question(&self, text: String) {
        let _ = self.tx.send(PipelineEvent::Question(text)).await;
    }
}

/// Drives the full voice pipeline.
pub struct ConversationOrchestrator {
    config: Config,
    source: AudioSource,
    distributor: Arc<AudioDistributor>,
    recognizer: Arc<SpeechRecognizerClient>,
    collector: Arc<UtteranceCollector>,
    generator: Arc<dyn ResponseGenerator>,
    synthesizer: SpeechSynthesizer,
    playback: AudioPlaybackQueue,
    conversation: Conversation,
    phase: Phase,
    events_tx: mpsc::Sender<PipelineEvent>,
    events_rx: mpsc::Receiver<PipelineEvent>,
    ack_cue: Option<Vec<u8>>,
    error_cue: Option<Vec<u8>>,
}

impl ConversationOrchestrator {
    /// Build the full pipeline from config.
    ///
    /// # Errors
    ///
    /// Returns error if the input device, playback device, or synthesizer
    /// cannot be initialized.
    pub fn new(config: Config, generator: Arc<dyn ResponseGenerator>) -> Result<Self> {
        let source = AudioSource::new(config.audio.input_device.as_deref())?;
        let distributor = Arc::new(AudioDistributor::new());
        let recognizer = Arc::new(SpeechRecognizerClient::new(
            config.recognizer.endpoint.clone(),
        ));
        let synthesizer = SpeechSynthesizer::new(&config.synthesis)?;
        let playback = AudioPlaybackQueue::new()?;
        let conversation = Conversation::new(config.llm.system_prompt.clone());

        let (events_tx, events_rx) = mpsc::channel(16);

        let collector = Arc::new(UtteranceCollector::spawn(
            config.recognizer.silence_timeout(),
            config.recognizer.min_question_length,
            Arc::new(QuestionRelay {
                tx: events_tx.clone(),
            }),
        ));

        let ack_cue = load_cue(&config.cues.ack, "ack");
        let error_cue = load_cue(&config.cues.error, "error");

        Ok(Self {
            config,
            source,
            distributor,
            recognizer,
            collector,
            generator,
            synthesizer,
            playback,
            conversation,
            phase: Phase::WaitingKeyword,
            events_tx,
            events_rx,
            ack_cue,
            error_cue,
        })
    }

    /// Run the conversation loop until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns error if audio capture or the keyword spotter cannot start.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        self.source.start(Arc::clone(&self.distributor))?;
        tracing::info!(device = %self.source.device_name(), "audio capture running");

        let spotter = EnergySpotter::from_assets(&self.config.keyword.assets())?;
        let detector = KeywordDetector::new(
            Box::new(spotter),
            Arc::new(KeywordRelay {
                tx: self.events_tx.clone(),
            }),
        );
        let detector_frames = self.distributor.register("keyword");
        let detector_task = tokio::spawn(detector.run(detector_frames, cancel.clone()));

        tracing::info!("waiting for keyword");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = self.events_rx.recv() => {
                    let Some(event) = event else { break };
                    self.handle_event(event).await;
                }
            }
        }

        self.shutdown().await;
        if let Err(e) = detector_task.await {
            tracing::warn!(error = %e, "keyword detector task join failed");
        }
        Ok(())
    }

    /// Dispatch an event against the current phase. Events arriving in
    /// the wrong phase are dropped, which is what keeps a late silence
    /// finalization or a mid-playback keyword from derailing the cycle.
    async fn handle_event(&mut self, event: PipelineEvent) {
        match (self.phase, event) {
            (Phase::WaitingKeyword, PipelineEvent::Keyword(keyword)) => {
                tracing::info!(keyword = %keyword, "keyword accepted");
                if let Err(e) = self.enter_listening().await {
                    tracing::error!(error = %e, "failed to start listening");
                    self.recover().await;
                }
            }
            (Phase::ListeningQuestion, PipelineEvent::Question(question)) => {
                if let Err(e) = self.handle_question(question).await {
                    tracing::error!(error = %e, "interaction cycle failed");
                    self.recover().await;
                }
            }
            (phase, event) => {
                tracing::trace!(phase = ?phase, event = ?event, "event ignored in current phase");
            }
        }
    }

    async fn enter_listening(&mut self) -> Result<()> {
        self.phase = Phase::ListeningQuestion;
        self.collector.reset().await;

        let frames = self.distributor.register("recognizer");
        let sink: Arc<dyn TranscriptSink> = self.collector.clone();

        // Acknowledge and connect concurrently so the cue never delays the
        // session.
        let ((), session) = tokio::join!(
            self.play_cue(self.ack_cue.as_deref()),
            self.recognizer.start_session(frames, sink),
        );
        session?;

        tracing::info!("listening for question");
        Ok(())
    }

    async fn handle_question(&mut self, question: String) -> Result<()> {
        // Recognition stops before generation so the spoken response never
        // leaks back into the transcript.
        self.recognizer.stop_session().await;
        self.phase = Phase::ProcessingResponse;
        tracing::info!(question = %question, "processing question");

        self.conversation.push_user(question);
        let stream = self.generator.generate(self.conversation.messages()).await?;

        self.phase = Phase::PlayingResponse;
        let sentences = Arc::new(SentenceQueue::new());
        let feeder = tokio::spawn(feed_sentences(stream, Arc::clone(&sentences)));
        let drain = self.playback.begin_drain();

        loop {
            match sentences.pop_sentence(SENTENCE_POLL_TIMEOUT).await {
                SentencePoll::Sentence(sentence) => {
                    match self.synthesizer.synthesize(&sentence).await {
                        Ok(audio) => self.playback.push_clip(audio),
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                sentence = %sentence,
                                "synthesis failed, skipping sentence"
                            );
                        }
                    }
                }
                SentencePoll::TimedOut => {
                    if feeder.is_finished() && !sentences.is_finished() {
                        tracing::warn!("sentence feed ended unexpectedly");
                        break;
                    }
                }
                SentencePoll::EndOfStream => break,
            }
        }

        if let Err(e) = feeder.await {
            tracing::warn!(error = %e, "sentence feeder join failed");
        }

        // End-of-response marker lets the player exit once the queue
        // drains.
        self.playback.push_clip(Vec::new());
        drain.wait().await;

        let response = sentences.full_text();
        self.conversation.push_assistant(&response);
        tracing::info!(chars = response.chars().count(), "response complete");

        self.phase = Phase::WaitingKeyword;
        tracing::info!("waiting for keyword");
        Ok(())
    }

    /// Reset to a clean waiting state after a failed cycle. Safe to call
    /// from any phase, repeatedly.
    async fn recover(&mut self) {
        self.playback.stop_playback();
        self.play_cue(self.error_cue.as_deref()).await;
        self.recognizer.stop_session().await;
        self.collector.reset().await;
        self.phase = Phase::WaitingKeyword;
        tracing::info!("recovered, waiting for keyword");
    }

    async fn shutdown(&mut self) {
        tracing::info!("shutting down");
        self.recognizer.stop_session().await;
        self.playback.stop_playback();
        self.source.stop();
    }

    async fn play_cue(&self, cue: Option<&[u8]>) {
        let Some(bytes) = cue else { return };
        self.playback.play_clip(bytes.to_vec()).await;
    }
}

/// Pump generated fragments into the sentence queue. The stream is always
/// closed on exit so the player can finish.
async fn feed_sentences(mut stream: FragmentStream, sentences: Arc<SentenceQueue>) {
    while let Some(fragment) = stream.next().await {
        match fragment {
            Ok(fragment) => sentences.push_fragment(&fragment),
            Err(e) => {
                tracing::warn!(error = %e, "response stream failed");
                break;
            }
        }
    }
    sentences.push_end_of_stream();
}

/// Load a feedback cue, if present. A missing cue degrades to silence.
fn load_cue(path: &Path, label: &str) -> Option<Vec<u8>> {
    match std::fs::read(path) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(
                cue = label,
                path = %path.display(),
                error = %e,
                "feedback cue unavailable"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment_stream(items: Vec<crate::Result<String>>) -> FragmentStream {
        Box::pin(tokio_stream::iter(items))
    }

    #[tokio::test]
    async fn feeder_splits_fragments_into_sentences() {
        let sentences = Arc::new(SentenceQueue::new());
        let stream = fragment_stream(vec![
            Ok("今天天气".to_string()),
            Ok("不错。出门".to_string()),
            Ok("记得带伞！".to_string()),
        ]);

        feed_sentences(stream, Arc::clone(&sentences)).await;

        assert_eq!(
            sentences.pop_sentence(Duration::from_millis(10)).await,
            SentencePoll::Sentence("今天天气不错。".to_string())
        );
        assert_eq!(
            sentences.pop_sentence(Duration::from_millis(10)).await,
            SentencePoll::Sentence("出门记得带伞！".to_string())
        );
        assert_eq!(
            sentences.pop_sentence(Duration::from_millis(10)).await,
            SentencePoll::EndOfStream
        );
        assert!(sentences.is_finished());
    }

    #[tokio::test]
    async fn feeder_flushes_remainder_on_stream_error() {
        let sentences = Arc::new(SentenceQueue::new());
        let stream = fragment_stream(vec![
            Ok("First part. And then".to_string()),
            Err(crate::Error::Agent("connection reset".to_string())),
            Ok("never delivered.".to_string()),
        ]);

        feed_sentences(stream, Arc::clone(&sentences)).await;

        assert_eq!(
            sentences.pop_sentence(Duration::from_millis(10)).await,
            SentencePoll::Sentence("First part.".to_string())
        );
        assert_eq!(
            sentences.pop_sentence(Duration::from_millis(10)).await,
            SentencePoll::Sentence("And then".to_string())
        );
        assert_eq!(
            sentences.pop_sentence(Duration::from_millis(10)).await,
            SentencePoll::EndOfStream
        );
    }

    #[tokio::test]
    async fn keyword_relay_forwards_hits() {
        let (tx, mut rx) = mpsc::channel(4);
        let relay = KeywordRelay { tx };
        relay.on_keyword("你好").await;

        match rx.recv().await {
            Some(PipelineEvent::Keyword(keyword)) => assert_eq!(keyword, "你好"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn question_relay_forwards_questions() {
        let (tx, mut rx) = mpsc::channel(4);
        let relay = QuestionRelay { tx };
        relay.on_question("杭州天气怎么样".to_string()).await;

        match rx.recv().await {
            Some(PipelineEvent::Question(question)) => assert_eq!(question, "杭州天气怎么样"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
