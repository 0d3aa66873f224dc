//! Ordered, interruptible clip playback

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};
use tokio::sync::oneshot;

use crate::audio::clip;
use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// How long the playback loop waits for a clip before re-checking stop
const POP_TIMEOUT: Duration = Duration::from_millis(500);

/// Result of popping from a [`ClipQueue`]
#[derive(Debug, PartialEq, Eq)]
pub enum ClipPop {
    /// Next queued clip in submission order
    Clip(Vec<u8>),
    /// Nothing arrived within the wait window
    TimedOut,
    /// The queue was stopped; all pending clips were discarded
    Stopped,
}

#[derive(Default)]
struct ClipQueueState {
    clips: VecDeque<Vec<u8>>,
    stopped: bool,
}

/// FIFO clip queue shared between submitters and the playback loop.
///
/// Stopping the queue discards everything unplayed; clips pushed while
/// stopped are ignored until the next drain resets it.
#[derive(Default)]
pub struct ClipQueue {
    state: Mutex<ClipQueueState>,
    available: Condvar,
}

impl ClipQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a clip in submission order.
    pub fn push(&self, bytes: Vec<u8>) {
        if let Ok(mut state) = self.state.lock() {
            if state.stopped {
                tracing::trace!("clip discarded, playback stopped");
                return;
            }
            state.clips.push_back(bytes);
        }
        self.available.notify_one();
    }

    /// Pop the next clip, waiting up to `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> ClipPop {
        let deadline = Instant::now() + timeout;
        let Ok(mut state) = self.state.lock() else {
            return ClipPop::Stopped;
        };

        loop {
            if state.stopped {
                return ClipPop::Stopped;
            }
            if let Some(bytes) = state.clips.pop_front() {
                return ClipPop::Clip(bytes);
            }
            let now = Instant::now();
            if now >= deadline {
                return ClipPop::TimedOut;
            }
            match self.available.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => state = guard,
                Err(_) => return ClipPop::Stopped,
            }
        }
    }

    /// Discard all unplayed clips and mark the queue stopped.
    pub fn stop(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.stopped = true;
            let discarded = state.clips.len();
            state.clips.clear();
            if discarded > 0 {
                tracing::debug!(discarded, "cleared unplayed clips");
            }
        }
        self.available.notify_all();
    }

    /// Clear the stopped flag and any leftover clips for a fresh drain.
    pub fn reset(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.stopped = false;
            state.clips.clear();
        }
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.lock().map(|s| s.stopped).unwrap_or(true)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.clips.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves when a playback drain loop has exited.
pub struct DrainHandle {
    done: oneshot::Receiver<()>,
}

impl DrainHandle {
    /// Wait for the drain loop to finish (sentinel reached or stopped).
    pub async fn wait(self) {
        let _ = self.done.await;
    }
}

/// Plays queued clips strictly in submission order on a dedicated thread.
///
/// An empty clip is the end-of-response sentinel: the drain loop exits once
/// it is reached. [`AudioPlaybackQueue::stop_playback`] interrupts the
/// current clip and discards the rest.
#[derive(Clone)]
pub struct AudioPlaybackQueue {
    queue: Arc<ClipQueue>,
    draining: Arc<AtomicBool>,
}

impl AudioPlaybackQueue {
    /// Create a playback queue, probing the output device up front.
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available.
    pub fn new() -> Result<Self> {
        let (device, config) = select_output_device()?;
        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            queue: Arc::new(ClipQueue::new()),
            draining: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Queue a clip for playback. An empty clip marks end of response.
    pub fn push_clip(&self, bytes: Vec<u8>) {
        self.queue.push(bytes);
    }

    /// Start the playback loop on its own thread.
    ///
    /// The returned handle resolves when the loop exits. Callers sequence
    /// drains so that at most one runs at a time; a second call while one
    /// is active returns an already-resolved handle.
    pub fn begin_drain(&self) -> DrainHandle {
        let (tx, rx) = oneshot::channel();

        if self.draining.swap(true, Ordering::AcqRel) {
            tracing::warn!("playback drain already running");
            let _ = tx.send(());
            return DrainHandle { done: rx };
        }

        self.queue.reset();
        let queue = Arc::clone(&self.queue);
        let draining = Arc::clone(&self.draining);
        let spawned = std::thread::Builder::new()
            .name("halo-playback".to_string())
            .spawn(move || run_drain_loop(&queue, &draining, tx));

        if let Err(e) = spawned {
            tracing::error!("failed to spawn playback thread: {e}");
            self.draining.store(false, Ordering::Release);
        }

        DrainHandle { done: rx }
    }

    /// Halt current output and discard all unplayed clips.
    ///
    /// Safe to call at any time, including when no drain is running.
    pub fn stop_playback(&self) {
        self.queue.stop();
    }

    /// Play a single clip to completion through a one-shot drain.
    pub async fn play_clip(&self, bytes: Vec<u8>) {
        let drain = self.begin_drain();
        self.push_clip(bytes);
        self.push_clip(Vec::new());
        drain.wait().await;
    }
}

fn run_drain_loop(queue: &Arc<ClipQueue>, draining: &Arc<AtomicBool>, done: oneshot::Sender<()>) {
    match select_output_device() {
        Ok((device, config)) => loop {
            match queue.pop_timeout(POP_TIMEOUT) {
                ClipPop::Stopped => {
                    tracing::debug!("playback stopped");
                    break;
                }
                ClipPop::TimedOut => {}
                ClipPop::Clip(bytes) if bytes.is_empty() => {
                    tracing::debug!("end of response reached");
                    break;
                }
                ClipPop::Clip(bytes) => play_one(&device, &config, queue, &bytes),
            }
        },
        Err(e) => {
            // Keep the pipeline alive: consume clips without playing them
            tracing::error!("output device unavailable, discarding clips: {e}");
            loop {
                match queue.pop_timeout(POP_TIMEOUT) {
                    ClipPop::Stopped => break,
                    ClipPop::Clip(bytes) if bytes.is_empty() => break,
                    ClipPop::Clip(_) | ClipPop::TimedOut => {}
                }
            }
        }
    }

    draining.store(false, Ordering::Release);
    let _ = done.send(());
}

fn play_one(device: &Device, config: &StreamConfig, queue: &ClipQueue, bytes: &[u8]) {
    let decoded = match clip::decode_clip(bytes) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::warn!("skipping undecodable clip: {e}");
            return;
        }
    };

    let samples = if decoded.sample_rate == config.sample_rate.0 {
        decoded.samples
    } else {
        match clip::resample(&decoded.samples, decoded.sample_rate, config.sample_rate.0) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!("skipping clip, resample failed: {e}");
                return;
            }
        }
    };

    if samples.is_empty() {
        return;
    }

    if let Err(e) = play_samples_blocking(device, config, queue, samples) {
        tracing::warn!("clip playback failed: {e}");
    }
}

fn play_samples_blocking(
    device: &Device,
    config: &StreamConfig,
    queue: &ClipQueue,
    samples: Vec<f32>,
) -> Result<()> {
    let channels = usize::from(config.channels);
    let sample_count = samples.len();
    let duration_ms = (sample_count as u64 * 1000) / u64::from(config.sample_rate.0);

    let finished = Arc::new(AtomicBool::new(false));
    let finished_cb = Arc::clone(&finished);
    let mut position = 0usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let value = if position < samples.len() {
                        position += 1;
                        samples[position - 1]
                    } else {
                        finished_cb.store(true, Ordering::Relaxed);
                        0.0
                    };
                    for out in frame.iter_mut() {
                        *out = value;
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio playback error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let start = Instant::now();
    let timeout = Duration::from_millis(duration_ms + 500);

    while !finished.load(Ordering::Relaxed) {
        if queue.is_stopped() {
            tracing::debug!("clip interrupted");
            break;
        }
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    if !queue.is_stopped() {
        // Let the tail of the clip leave the device buffer
        std::thread::sleep(Duration::from_millis(100));
    }

    drop(stream);
    tracing::debug!(samples = sample_count, "clip playback complete");
    Ok(())
}

fn select_output_device() -> Result<(Device, StreamConfig)> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
        });

    let config = match supported {
        Some(c) => c.with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE)).config(),
        None => {
            let default = device
                .default_output_config()
                .map_err(|e| Error::Audio(e.to_string()))?;
            tracing::warn!(
                sample_rate = default.sample_rate().0,
                channels = default.channels(),
                "no output config at 24kHz, using device defaults"
            );
            default.config()
        }
    };

    Ok((device, config))
}
