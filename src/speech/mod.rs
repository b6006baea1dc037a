//! Narration output for the player
//!
//! This module provides:
//! - The backend seam over a platform speech capability
//! - A driver that keeps at most one utterance in flight
//! - Simulated, recording and unavailable backends

pub mod backends;
pub mod config;
pub mod driver;

// Re-export commonly used types
pub use backends::{RecordedUtterance, RecordingBackend, SimulatedBackend, UnavailableBackend};
pub use config::{NarrationRequest, SpeechConfig, VoiceSettings};
pub use driver::{
    DriverCompletion, NarrationBackend, NarrationDriver, NarrationEvent, NarrationEventKind,
    SpeakOutcome, UtteranceId,
};
