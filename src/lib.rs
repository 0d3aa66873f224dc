//! Halo - voice-activated conversational agent
//!
//! This library provides the core pipeline for the Halo agent:
//! - Shared microphone capture with per-stage frame fan-out
//! - Keyword spotting and duplex streaming speech recognition
//! - Streaming LLM response generation with sentence segmentation
//! - Speech synthesis and ordered, interruptible playback
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Audio Capture                       │
//! │        mic ──► frame distributor (fan-out)           │
//! └──────────┬─────────────────────────┬────────────────┘
//!            │                         │
//! ┌──────────▼──────────┐   ┌──────────▼────────────────┐
//! │   Keyword Spotter   │   │   Speech Recognizer (WS)   │
//! └──────────┬──────────┘   └──────────┬────────────────┘
//!            │                         │
//! ┌──────────▼─────────────────────────▼────────────────┐
//! │                   Orchestrator                       │
//! │   waiting ─► listening ─► processing ─► playing      │
//! └──────────┬──────────────────────────────────────────┘
//!            │
//! ┌──────────▼──────────────────────────────────────────┐
//! │   LLM stream ─► sentences ─► synthesis ─► playback   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod audio;
pub mod config;
pub mod error;
pub mod keyword;
pub mod orchestrator;
pub mod recognizer;
pub mod synth;
pub mod text;

pub use config::Config;
pub use error::{Error, Result};
pub use orchestrator::ConversationOrchestrator;
