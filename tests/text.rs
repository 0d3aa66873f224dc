//! Sentence streaming integration tests
//!
//! Feeds response fragments through the sentence queue the way the
//! generation task does during playback.

use halo_agent::text::{SentencePoll, SentenceQueue};
use std::time::Duration;

const POP_TIMEOUT: Duration = Duration::from_millis(50);

#[tokio::test]
async fn test_mixed_punctuation_splits_into_sentences() {
    let queue = SentenceQueue::new();
    queue.push_fragment("Hello world. How ");
    queue.push_fragment("are you?");
    queue.push_end_of_stream();

    assert_eq!(
        queue.pop_sentence(POP_TIMEOUT).await,
        SentencePoll::Sentence("Hello world.".to_string())
    );
    assert_eq!(
        queue.pop_sentence(POP_TIMEOUT).await,
        SentencePoll::Sentence("How are you?".to_string())
    );
    assert_eq!(queue.pop_sentence(POP_TIMEOUT).await, SentencePoll::EndOfStream);
}

#[tokio::test]
async fn test_cjk_fragments_split_on_fullwidth_punctuation() {
    let queue = SentenceQueue::new();
    queue.push_fragment("今天天气不");
    queue.push_fragment("错。明天呢");

    assert_eq!(
        queue.pop_sentence(POP_TIMEOUT).await,
        SentencePoll::Sentence("今天天气不错。".to_string())
    );

    // The tail has no terminator yet, so it stays buffered.
    assert_eq!(queue.pop_sentence(POP_TIMEOUT).await, SentencePoll::TimedOut);

    queue.push_end_of_stream();
    assert_eq!(
        queue.pop_sentence(POP_TIMEOUT).await,
        SentencePoll::Sentence("明天呢".to_string())
    );
    assert_eq!(queue.pop_sentence(POP_TIMEOUT).await, SentencePoll::EndOfStream);
}

#[tokio::test]
async fn test_end_of_stream_flushes_unterminated_text() {
    let queue = SentenceQueue::new();
    queue.push_fragment("no punctuation at all");
    queue.push_end_of_stream();

    assert_eq!(
        queue.pop_sentence(POP_TIMEOUT).await,
        SentencePoll::Sentence("no punctuation at all".to_string())
    );
    assert_eq!(queue.pop_sentence(POP_TIMEOUT).await, SentencePoll::EndOfStream);
    assert!(queue.is_finished());
}

#[tokio::test]
async fn test_empty_stream_ends_cleanly() {
    let queue = SentenceQueue::new();
    queue.push_end_of_stream();

    assert_eq!(queue.pop_sentence(POP_TIMEOUT).await, SentencePoll::EndOfStream);
    assert!(queue.is_finished());
}

#[tokio::test]
async fn test_pop_times_out_while_stream_is_open() {
    let queue = SentenceQueue::new();

    assert_eq!(queue.pop_sentence(POP_TIMEOUT).await, SentencePoll::TimedOut);
    assert!(!queue.is_finished());
}

#[tokio::test]
async fn test_full_text_preserves_the_entire_response() {
    let queue = SentenceQueue::new();
    queue.push_fragment("你好！");
    queue.push_fragment("今天是晴天。");
    queue.push_end_of_stream();

    assert_eq!(queue.full_text(), "你好！今天是晴天。");
}
