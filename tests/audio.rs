//! Audio pipeline integration tests
//!
//! Tests frame distribution, clip queueing, and clip decoding without
//! requiring audio hardware.

use halo_agent::audio::{
    AudioDistributor, AudioFrame, CONSUMER_QUEUE_CAPACITY, ClipPop, ClipQueue, SAMPLE_RATE,
    decode_clip, samples_to_wav,
};
use std::sync::Arc;
use std::time::Duration;

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Frame whose samples carry a recognizable tag value
fn tagged_frame(tag: f32) -> AudioFrame {
    AudioFrame::new(vec![tag; 8])
}

fn frame_tag(frame: &AudioFrame) -> f32 {
    frame.samples[0]
}

#[tokio::test]
async fn test_distributor_delivers_frames_in_order() {
    let distributor = Arc::new(AudioDistributor::new());
    let consumer = distributor.register("order");

    for tag in 0..5 {
        distributor.dispatch(&tagged_frame(tag as f32));
    }

    for tag in 0..5 {
        let frame = consumer.recv(Duration::from_millis(100)).await.unwrap();
        assert_eq!(frame_tag(&frame), tag as f32);
    }
}

#[tokio::test]
async fn test_distributor_fans_out_to_all_consumers() {
    let distributor = Arc::new(AudioDistributor::new());
    let first = distributor.register("first");
    let second = distributor.register("second");
    assert_eq!(distributor.consumer_count(), 2);

    distributor.dispatch(&tagged_frame(7.0));

    let a = first.recv(Duration::from_millis(100)).await.unwrap();
    let b = second.recv(Duration::from_millis(100)).await.unwrap();
    assert_eq!(frame_tag(&a), 7.0);
    assert_eq!(frame_tag(&b), 7.0);
}

#[test]
fn test_slow_consumer_keeps_newest_frames() {
    let distributor = Arc::new(AudioDistributor::new());
    let consumer = distributor.register("slow");

    let overflow = 20;
    for tag in 0..(CONSUMER_QUEUE_CAPACITY + overflow) {
        distributor.dispatch(&tagged_frame(tag as f32));
    }

    assert_eq!(consumer.len(), CONSUMER_QUEUE_CAPACITY);
    assert_eq!(consumer.dropped(), overflow as u64);

    // Oldest frames were evicted, so the head is the first surviving tag.
    let head = consumer.try_recv().unwrap();
    assert_eq!(frame_tag(&head), overflow as f32);
}

#[test]
fn test_consumer_unregisters_on_drop() {
    let distributor = Arc::new(AudioDistributor::new());
    {
        let _consumer = distributor.register("ephemeral");
        assert_eq!(distributor.consumer_count(), 1);
    }
    assert_eq!(distributor.consumer_count(), 0);

    // Dispatch with nobody listening must not panic.
    distributor.dispatch(&tagged_frame(1.0));
}

#[tokio::test]
async fn test_recv_times_out_on_empty_queue() {
    let distributor = Arc::new(AudioDistributor::new());
    let consumer = distributor.register("idle");

    assert!(consumer.recv(Duration::from_millis(20)).await.is_none());
    assert!(consumer.try_recv().is_none());
}

#[test]
fn test_clip_queue_pops_in_submission_order() {
    let queue = ClipQueue::new();
    queue.push(vec![1]);
    queue.push(vec![2]);

    assert_eq!(
        queue.pop_timeout(Duration::from_millis(20)),
        ClipPop::Clip(vec![1])
    );
    assert_eq!(
        queue.pop_timeout(Duration::from_millis(20)),
        ClipPop::Clip(vec![2])
    );
    assert_eq!(
        queue.pop_timeout(Duration::from_millis(20)),
        ClipPop::TimedOut
    );
}

#[test]
fn test_clip_queue_stop_discards_pending_clips() {
    let queue = ClipQueue::new();
    queue.push(vec![1]);
    queue.push(vec![2]);

    queue.stop();
    assert!(queue.is_stopped());
    assert!(queue.is_empty());
    assert_eq!(queue.pop_timeout(Duration::from_millis(20)), ClipPop::Stopped);

    // Pushes while stopped are ignored.
    queue.push(vec![3]);
    assert!(queue.is_empty());
}

#[test]
fn test_clip_queue_reset_accepts_clips_again() {
    let queue = ClipQueue::new();
    queue.stop();
    queue.reset();
    assert!(!queue.is_stopped());

    queue.push(vec![4]);
    assert_eq!(
        queue.pop_timeout(Duration::from_millis(20)),
        ClipPop::Clip(vec![4])
    );
}

#[test]
fn test_wav_roundtrip_through_decoder() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let decoded = decode_clip(&wav).unwrap();
    assert_eq!(decoded.sample_rate, SAMPLE_RATE);
    assert_eq!(decoded.samples.len(), samples.len());

    // 16-bit quantization keeps samples within one step of the source.
    for (original, restored) in samples.iter().zip(decoded.samples.iter()) {
        assert!((original - restored).abs() < 0.001);
    }
}

#[test]
fn test_decode_rejects_unknown_payload() {
    assert!(decode_clip(&[0x00, 0x01, 0x02, 0x03]).is_err());
    assert!(decode_clip(&[]).is_err());
}
