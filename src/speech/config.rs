//! Voice and timing configuration for narration

use crate::{Result, WordcastError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Slowest and fastest rate accepted by speech backends
pub const MIN_RATE: f32 = 0.1;
pub const MAX_RATE: f32 = 10.0;

/// Language and optional voice for one narrated field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    /// BCP-47 language code, e.g. "en-US"
    pub language: String,

    /// Backend-specific voice name; the backend picks a default when absent
    #[serde(default)]
    pub voice_hint: Option<String>,
}

impl VoiceSettings {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            voice_hint: None,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice_hint = Some(voice.into());
        self
    }
}

/// Configuration for the narration driver
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Speech rate (1.0 = normal)
    pub rate: f32,

    /// Wait after force-stopping an utterance before starting the next one
    pub settle_ms: u64,

    /// How long the backend may report silence for an in-flight utterance
    /// before the utterance is considered lost
    pub stall_grace_ms: u64,

    /// Voice for the translation field
    pub translation: VoiceSettings,

    /// Voice for the foreign term
    pub foreign: VoiceSettings,

    /// Voice for the tip field
    pub tip: VoiceSettings,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            rate: 1.0,
            settle_ms: 50,
            stall_grace_ms: 1500,
            translation: VoiceSettings::new("en-US"),
            foreign: VoiceSettings::new("de-DE"),
            tip: VoiceSettings::new("en-US"),
        }
    }
}

impl SpeechConfig {
    /// Set the speech rate
    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_settle_ms(mut self, settle_ms: u64) -> Self {
        self.settle_ms = settle_ms;
        self
    }

    pub fn with_stall_grace_ms(mut self, stall_grace_ms: u64) -> Self {
        self.stall_grace_ms = stall_grace_ms;
        self
    }

    pub fn with_translation_voice(mut self, voice: VoiceSettings) -> Self {
        self.translation = voice;
        self
    }

    pub fn with_foreign_voice(mut self, voice: VoiceSettings) -> Self {
        self.foreign = voice;
        self
    }

    pub fn with_tip_voice(mut self, voice: VoiceSettings) -> Self {
        self.tip = voice;
        self
    }

    /// Rate clamped into the range backends accept
    pub fn effective_rate(&self) -> f32 {
        if self.rate.is_finite() {
            self.rate.clamp(MIN_RATE, MAX_RATE)
        } else {
            1.0
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn stall_grace(&self) -> Duration {
        Duration::from_millis(self.stall_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, voice) in [
            ("translation", &self.translation),
            ("foreign", &self.foreign),
            ("tip", &self.tip),
        ] {
            if voice.language.trim().is_empty() {
                return Err(WordcastError::Config(format!(
                    "{} voice needs a language code",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// A single utterance handed to the driver
#[derive(Clone, Debug, PartialEq)]
pub struct NarrationRequest {
    pub text: String,
    pub language: String,
    pub rate: f32,
    pub voice_hint: Option<String>,
}

impl NarrationRequest {
    pub fn new(text: impl Into<String>, voice: &VoiceSettings, rate: f32) -> Self {
        Self {
            text: text.into(),
            language: voice.language.clone(),
            rate,
            voice_hint: voice.voice_hint.clone(),
        }
    }
}
