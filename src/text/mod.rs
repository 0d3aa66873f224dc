//! Sentence segmentation of streaming response text

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::sync::{mpsc, Mutex};

/// A complete sentence: any run of text closed by sentence-ending
/// punctuation, CJK or Latin.
static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^。！？；.!?;]*[。！？；.!?;]+").expect("valid regex"));

/// Result of polling for the next sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentencePoll {
    Sentence(String),
    EndOfStream,
    TimedOut,
}

struct Segments {
    current: String,
    full: String,
}

/// Splits streaming response text into complete sentences.
///
/// Fragments accumulate until punctuation completes one or more
/// sentences; completed sentences are queued for synthesis while the
/// unterminated remainder waits for more text. End of stream flushes the
/// remainder as a final sentence.
pub struct SentenceQueue {
    segments: std::sync::Mutex<Segments>,
    tx: mpsc::UnboundedSender<Option<String>>,
    rx: Mutex<mpsc::UnboundedReceiver<Option<String>>>,
    finished: AtomicBool,
}

impl SentenceQueue {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            segments: std::sync::Mutex::new(Segments {
                current: String::new(),
                full: String::new(),
            }),
            tx,
            rx: Mutex::new(rx),
            finished: AtomicBool::new(false),
        }
    }

    /// Append a response fragment; enqueue any sentences it completes.
    pub fn push_fragment(&self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        let sentences = {
            let Ok(mut segments) = self.segments.lock() else {
                return;
            };
            segments.current.push_str(fragment);
            segments.full.push_str(fragment);
            split_complete(&mut segments.current)
        };
        for sentence in sentences {
            tracing::debug!(sentence = %sentence, "sentence ready");
            let _ = self.tx.send(Some(sentence));
        }
    }

    /// Flush the unterminated remainder and mark the stream complete.
    pub fn push_end_of_stream(&self) {
        let remainder = {
            let Ok(mut segments) = self.segments.lock() else {
                return;
            };
            std::mem::take(&mut segments.current)
        };
        let remainder = remainder.trim();
        if !remainder.is_empty() {
            let _ = self.tx.send(Some(remainder.to_string()));
        }
        self.finished.store(true, Ordering::SeqCst);
        let _ = self.tx.send(None);
    }

    /// Wait up to `timeout` for the next sentence.
    pub async fn pop_sentence(&self, timeout: Duration) -> SentencePoll {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Err(_) => SentencePoll::TimedOut,
            Ok(Some(Some(sentence))) => SentencePoll::Sentence(sentence),
            Ok(Some(None) | None) => SentencePoll::EndOfStream,
        }
    }

    /// Whether the generator has finished feeding text.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Complete response text accumulated so far.
    #[must_use]
    pub fn full_text(&self) -> String {
        self.segments
            .lock()
            .map_or_else(|_| String::new(), |segments| segments.full.clone())
    }
}

impl Default for SentenceQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain complete sentences off the front of the buffer, leaving the
/// unterminated remainder in place.
fn split_complete(current: &mut String) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut consumed = 0;
    for found in SENTENCE_BOUNDARY.find_iter(current) {
        let sentence = found.as_str().trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_string());
        }
        consumed = found.end();
    }
    current.drain(..consumed);
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin_sentences_split_on_punctuation() {
        let mut buffer = "Hello world. How are you?".to_string();
        let sentences = split_complete(&mut buffer);
        assert_eq!(sentences, vec!["Hello world.", "How are you?"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn cjk_sentences_split_on_fullwidth_punctuation() {
        let mut buffer = "你好。今天天气不错！还在下".to_string();
        let sentences = split_complete(&mut buffer);
        assert_eq!(sentences, vec!["你好。", "今天天气不错！"]);
        assert_eq!(buffer, "还在下");
    }

    #[test]
    fn unterminated_text_stays_buffered() {
        let mut buffer = "no punctuation yet".to_string();
        assert!(split_complete(&mut buffer).is_empty());
        assert_eq!(buffer, "no punctuation yet");
    }

    #[test]
    fn consecutive_terminators_stay_attached() {
        let mut buffer = "Really?! Yes.".to_string();
        let sentences = split_complete(&mut buffer);
        assert_eq!(sentences, vec!["Really?!", "Yes."]);
    }
}
