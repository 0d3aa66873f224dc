//! Streaming speech recognition: duplex transport plus utterance assembly

mod client;
mod collector;

pub use client::{
    RecognitionEvent, SegmentTracker, SessionState, SpeechRecognizerClient, TranscriptSink,
};
pub use collector::{QuestionSink, UtteranceCollector};
