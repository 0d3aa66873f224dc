//! Keyword spotting over the shared audio stream

mod assets;
mod detector;

pub use assets::{KeywordEntry, SpotterAssets, DEFAULT_BOOST_SCORE, DEFAULT_THRESHOLD};
pub use detector::{EnergySpotter, KeywordDetector, KeywordSink, KeywordStream};
