//! Configuration for the narrator
//!
//! Provides centralized configuration for all components. Every field is
//! optional in TOML; missing sections fall back to their defaults.

use crate::playback::{PlaybackConfig, WatchdogConfig};
use crate::speech::SpeechConfig;
use crate::{Result, WordcastError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the complete narrator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NarratorConfig {
    /// Repeat count, delays and end-of-list policy
    pub playback: PlaybackConfig,

    /// Voices, rate and driver timing
    pub speech: SpeechConfig,

    pub watchdog: WatchdogConfig,

    /// Capacity of the command and event channels
    pub channel_buffer_size: usize,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            playback: PlaybackConfig::default(),
            speech: SpeechConfig::default(),
            watchdog: WatchdogConfig::default(),
            channel_buffer_size: 100,
        }
    }
}

impl NarratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| WordcastError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Set the playback configuration
    pub fn with_playback(mut self, playback: PlaybackConfig) -> Self {
        self.playback = playback;
        self
    }

    /// Set the speech configuration
    pub fn with_speech(mut self, speech: SpeechConfig) -> Self {
        self.speech = speech;
        self
    }

    pub fn with_watchdog(mut self, watchdog: WatchdogConfig) -> Self {
        self.watchdog = watchdog;
        self
    }

    /// Set the channel buffer size
    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.playback.validate()?;
        self.speech.validate()?;
        self.watchdog.validate()?;
        if self.channel_buffer_size == 0 {
            return Err(WordcastError::Config(
                "channel_buffer_size must be positive".into(),
            ));
        }
        Ok(())
    }
}
