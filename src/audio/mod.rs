//! Audio capture, frame fan-out, clip decoding, and playback

mod clip;
mod distributor;
mod playback;
mod source;

pub use clip::{DecodedClip, decode_clip, decode_mp3, decode_wav, resample};
pub use distributor::{AudioDistributor, CONSUMER_QUEUE_CAPACITY, FrameConsumer};
pub use playback::{AudioPlaybackQueue, ClipPop, ClipQueue, DrainHandle};
pub use source::{AudioFrame, AudioSource, FRAME_SAMPLES, SAMPLE_RATE, samples_to_wav};
