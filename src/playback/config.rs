//! Playback pacing configuration

use crate::{Result, WordcastError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What ADVANCE does at the last record, for manual skips and auto-advance alike
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOfList {
    /// Continue at the first record
    #[default]
    Wrap,
    /// Stay on the last record and return to Idle
    Halt,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Full narration cycles per record before advancing
    pub repeat_count: u32,

    /// Silence between the last cycle of one record and the next record
    pub inter_record_delay_ms: u64,

    /// Silence between fields within one cycle
    pub field_pause_ms: u64,

    /// Only narrate the first N active records
    pub max_active: Option<usize>,

    pub end_of_list: EndOfList,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            repeat_count: 1,
            inter_record_delay_ms: 1000,
            field_pause_ms: 100,
            max_active: None,
            end_of_list: EndOfList::Wrap,
        }
    }
}

impl PlaybackConfig {
    pub fn with_repeat_count(mut self, repeat_count: u32) -> Self {
        self.repeat_count = repeat_count;
        self
    }

    pub fn with_inter_record_delay_ms(mut self, delay_ms: u64) -> Self {
        self.inter_record_delay_ms = delay_ms;
        self
    }

    pub fn with_field_pause_ms(mut self, pause_ms: u64) -> Self {
        self.field_pause_ms = pause_ms;
        self
    }

    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = Some(max_active);
        self
    }

    pub fn with_end_of_list(mut self, end_of_list: EndOfList) -> Self {
        self.end_of_list = end_of_list;
        self
    }

    pub fn inter_record_delay(&self) -> Duration {
        Duration::from_millis(self.inter_record_delay_ms)
    }

    pub fn field_pause(&self) -> Duration {
        Duration::from_millis(self.field_pause_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.repeat_count == 0 {
            return Err(WordcastError::Config(
                "repeat_count must be at least 1".into(),
            ));
        }
        if self.max_active == Some(0) {
            return Err(WordcastError::Config(
                "max_active must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_config_default() {
        let config = PlaybackConfig::default();
        assert_eq!(config.repeat_count, 1);
        assert_eq!(config.field_pause(), Duration::from_millis(100));
        assert_eq!(config.end_of_list, EndOfList::Wrap);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_repeat_rejected() {
        let config = PlaybackConfig::default().with_repeat_count(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_end_of_list_serde() {
        let policy: EndOfList = serde_json::from_str("\"halt\"").unwrap();
        assert_eq!(policy, EndOfList::Halt);
    }
}
