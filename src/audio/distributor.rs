//! Frame fan-out to registered consumers

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::Notify;

use crate::audio::AudioFrame;

/// Frames buffered per consumer before the oldest is evicted
pub const CONSUMER_QUEUE_CAPACITY: usize = 100;

struct ConsumerQueue {
    id: u64,
    label: String,
    frames: Mutex<VecDeque<AudioFrame>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl ConsumerQueue {
    fn push(&self, frame: AudioFrame) {
        if let Ok(mut frames) = self.frames.lock() {
            if frames.len() >= CONSUMER_QUEUE_CAPACITY {
                frames.pop_front();
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if total % 100 == 1 {
                    tracing::warn!(
                        consumer = %self.label,
                        dropped = total,
                        "consumer queue full, dropping oldest frame"
                    );
                }
            }
            frames.push_back(frame);
        }
        self.notify.notify_one();
    }

    fn take(&self) -> Option<AudioFrame> {
        self.frames
            .lock()
            .ok()
            .and_then(|mut frames| frames.pop_front())
    }

    fn len(&self) -> usize {
        self.frames.lock().map(|frames| frames.len()).unwrap_or(0)
    }
}

/// Fans captured frames out to all registered consumers.
///
/// Each consumer owns a bounded queue; a slow consumer loses its oldest
/// frames, never the newest, and never affects other consumers.
#[derive(Default)]
pub struct AudioDistributor {
    consumers: Mutex<Vec<Arc<ConsumerQueue>>>,
    next_id: AtomicU64,
}

impl AudioDistributor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer and return its receiving handle.
    ///
    /// The handle unregisters itself when dropped.
    #[must_use]
    pub fn register(self: &Arc<Self>, label: &str) -> FrameConsumer {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(ConsumerQueue {
            id,
            label: label.to_string(),
            frames: Mutex::new(VecDeque::with_capacity(CONSUMER_QUEUE_CAPACITY)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        });

        if let Ok(mut consumers) = self.consumers.lock() {
            consumers.push(Arc::clone(&queue));
        }

        tracing::debug!(consumer = label, id, "consumer registered");
        FrameConsumer {
            queue,
            distributor: Arc::downgrade(self),
        }
    }

    /// Remove a consumer registration entirely.
    pub fn unregister(&self, id: u64) {
        if let Ok(mut consumers) = self.consumers.lock() {
            if let Some(pos) = consumers.iter().position(|c| c.id == id) {
                let removed = consumers.swap_remove(pos);
                tracing::debug!(consumer = %removed.label, id, "consumer unregistered");
            }
        }
    }

    /// Push a copy of the frame to every registered consumer.
    ///
    /// The registration list is snapshotted before delivery, so a consumer
    /// registered mid-dispatch joins from the next dispatch. Runs on the
    /// capture thread and never blocks.
    pub fn dispatch(&self, frame: &AudioFrame) {
        let snapshot: Vec<Arc<ConsumerQueue>> = match self.consumers.lock() {
            Ok(consumers) => consumers.clone(),
            Err(_) => return,
        };
        for consumer in snapshot {
            consumer.push(frame.clone());
        }
    }

    /// Number of currently registered consumers
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.consumers.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// Receiving end of one consumer registration.
pub struct FrameConsumer {
    queue: Arc<ConsumerQueue>,
    distributor: Weak<AudioDistributor>,
}

impl FrameConsumer {
    /// Pop the oldest queued frame, waiting up to `timeout` for one to
    /// arrive. Returns `None` on timeout.
    pub async fn recv(&self, timeout: Duration) -> Option<AudioFrame> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.queue.notify.notified();
            if let Some(frame) = self.queue.take() {
                return Some(frame);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.queue.take();
            }
        }
    }

    /// Pop the oldest queued frame without waiting.
    #[must_use]
    pub fn try_recv(&self) -> Option<AudioFrame> {
        self.queue.take()
    }

    /// Total frames evicted from this queue by overflow
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// Registration label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.queue.label
    }

    /// Frames currently queued
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for FrameConsumer {
    fn drop(&mut self) {
        if let Some(distributor) = self.distributor.upgrade() {
            distributor.unregister(self.queue.id);
        }
    }
}
