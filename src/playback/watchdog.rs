//! Periodic check that restarts a stalled autoplay loop

use crate::{Result, WordcastError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub interval_ms: u64,
    pub enabled: bool,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            enabled: true,
        }
    }
}

impl WatchdogConfig {
    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.interval_ms == 0 {
            return Err(WordcastError::Config(
                "watchdog interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// What the controller knows at the moment the watchdog fires
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WatchdogProbe {
    pub is_playing: bool,
    /// The driver holds an in-flight or settling utterance
    pub driver_busy: bool,
    /// A cycle for the current session is speaking or pausing between fields
    pub cycle_running: bool,
    /// The inter-record delay timer is armed
    pub delay_armed: bool,
    pub token_cancelled: bool,
}

impl WatchdogProbe {
    pub fn is_stalled(&self) -> bool {
        self.is_playing
            && !self.token_cancelled
            && !self.driver_busy
            && !self.cycle_running
            && !self.delay_armed
    }
}

pub struct Watchdog {
    config: WatchdogConfig,
    next_check: Option<Instant>,
}

impl Watchdog {
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            next_check: None,
        }
    }

    /// Start ticking if not already
    pub fn arm(&mut self, now: Instant) {
        if self.config.enabled && self.next_check.is_none() {
            self.next_check = Some(now + self.config.interval());
        }
    }

    pub fn disarm(&mut self) {
        self.next_check = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_check.is_some()
    }

    /// Returns true when the loop has stalled and narration should restart
    pub fn poll(&mut self, now: Instant, probe: WatchdogProbe) -> bool {
        let Some(due) = self.next_check else {
            return false;
        };
        if now < due {
            return false;
        }
        self.next_check = Some(now + self.config.interval());

        if probe.is_stalled() {
            warn!("Autoplay loop stalled; restarting narration");
            return true;
        }
        false
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_check
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stalled() -> WatchdogProbe {
        WatchdogProbe {
            is_playing: true,
            ..WatchdogProbe::default()
        }
    }

    #[test]
    fn test_fires_only_after_interval() {
        let mut dog = Watchdog::new(WatchdogConfig::default());
        let t0 = Instant::now();
        dog.arm(t0);

        assert!(!dog.poll(t0 + Duration::from_millis(999), stalled()));
        assert!(dog.poll(t0 + Duration::from_millis(1000), stalled()));
        // Next check is one interval later
        assert!(!dog.poll(t0 + Duration::from_millis(1500), stalled()));
        assert!(dog.poll(t0 + Duration::from_millis(2000), stalled()));
    }

    #[test]
    fn test_busy_probe_is_not_stalled() {
        let busy_states = [
            WatchdogProbe {
                driver_busy: true,
                ..stalled()
            },
            WatchdogProbe {
                cycle_running: true,
                ..stalled()
            },
            WatchdogProbe {
                delay_armed: true,
                ..stalled()
            },
            WatchdogProbe {
                token_cancelled: true,
                ..stalled()
            },
            WatchdogProbe::default(),
        ];
        for probe in busy_states {
            assert!(!probe.is_stalled(), "{:?}", probe);
        }
    }

    #[test]
    fn test_disarmed_never_fires() {
        let mut dog = Watchdog::new(WatchdogConfig::default());
        let t0 = Instant::now();
        dog.arm(t0);
        dog.disarm();
        assert!(!dog.poll(t0 + Duration::from_secs(10), stalled()));
        assert_eq!(dog.next_deadline(), None);
    }

    #[test]
    fn test_disabled_config() {
        let mut dog = Watchdog::new(WatchdogConfig::default().with_enabled(false));
        dog.arm(Instant::now());
        assert!(!dog.is_armed());
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(WatchdogConfig::default().with_interval_ms(0).validate().is_err());
    }
}
