//! Narration driver with forced preemption
//!
//! The driver wraps a [`NarrationBackend`] and owns the only "busy" flag the
//! player trusts. Backends report progress by sending [`NarrationEvent`]s on a
//! channel; any event that does not belong to the in-flight utterance is stale
//! and dropped here, so a late callback from a cancelled utterance can never
//! complete a newer one.

use super::config::{NarrationRequest, SpeechConfig};
use crate::{Result, WordcastError};
use crossbeam_channel::Sender;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

pub type UtteranceId = Uuid;

/// Progress reported by a backend for one utterance
#[derive(Clone, Debug, PartialEq)]
pub enum NarrationEventKind {
    Started,
    Finished,
    Failed(String),
    Cancelled,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NarrationEvent {
    pub utterance: UtteranceId,
    pub kind: NarrationEventKind,
}

impl NarrationEvent {
    pub fn new(utterance: UtteranceId, kind: NarrationEventKind) -> Self {
        Self { utterance, kind }
    }
}

/// Platform speech capability
pub trait NarrationBackend: Send {
    /// Whether speech output exists at all on this host
    fn is_available(&self) -> bool;

    /// Begin speaking. Completion must be reported on `events`.
    fn speak(
        &mut self,
        utterance: UtteranceId,
        request: &NarrationRequest,
        events: Sender<NarrationEvent>,
    ) -> Result<()>;

    /// Stop everything immediately
    fn cancel_all(&mut self);

    /// Platform-level "audio is playing" flag. Only used to detect lost callbacks.
    fn is_speaking(&self) -> bool;
}

/// Result of asking the driver to speak
#[derive(Clone, Debug, PartialEq)]
pub enum SpeakOutcome {
    /// Nothing to say; treat as immediate success
    Skipped,
    /// Handed to the backend
    Started(UtteranceId),
    /// Waiting for the settle interval after a forced stop
    Deferred(UtteranceId),
}

impl SpeakOutcome {
    pub fn utterance(&self) -> Option<UtteranceId> {
        match self {
            SpeakOutcome::Skipped => None,
            SpeakOutcome::Started(id) | SpeakOutcome::Deferred(id) => Some(*id),
        }
    }
}

/// Non-stale progress surfaced to the player
#[derive(Clone, Debug, PartialEq)]
pub enum DriverCompletion {
    Started(UtteranceId),
    Finished(UtteranceId),
    Failed(UtteranceId, WordcastError),
    Cancelled(UtteranceId),
}

struct InFlight {
    id: UtteranceId,
    quiet_since: Option<Instant>,
}

struct Pending {
    id: UtteranceId,
    request: NarrationRequest,
    not_before: Instant,
}

pub struct NarrationDriver {
    backend: Box<dyn NarrationBackend>,
    events_tx: Sender<NarrationEvent>,
    settle: Duration,
    stall_grace: Duration,
    in_flight: Option<InFlight>,
    pending: Option<Pending>,
    settle_until: Option<Instant>,
}

impl NarrationDriver {
    pub fn new(
        backend: Box<dyn NarrationBackend>,
        config: &SpeechConfig,
        events_tx: Sender<NarrationEvent>,
    ) -> Self {
        Self {
            backend,
            events_tx,
            settle: config.settle(),
            stall_grace: config.stall_grace(),
            in_flight: None,
            pending: None,
            settle_until: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Something is speaking or waiting to speak
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some() || self.pending.is_some()
    }

    /// Speak `request`, preempting whatever is in flight
    pub fn speak(&mut self, request: NarrationRequest, now: Instant) -> Result<SpeakOutcome> {
        if !self.backend.is_available() {
            return Err(WordcastError::Unsupported(
                "no speech backend available".into(),
            ));
        }

        if request.text.trim().is_empty() {
            return Ok(SpeakOutcome::Skipped);
        }

        if self.is_busy() {
            self.cancel(now);
        }

        let id = Uuid::new_v4();
        match self.settle_until {
            Some(until) if now < until => {
                debug!("Deferring utterance {} until settle interval passes", id);
                self.pending = Some(Pending {
                    id,
                    request,
                    not_before: until,
                });
                Ok(SpeakOutcome::Deferred(id))
            }
            _ => {
                self.launch(id, &request)?;
                Ok(SpeakOutcome::Started(id))
            }
        }
    }

    fn launch(&mut self, id: UtteranceId, request: &NarrationRequest) -> Result<()> {
        debug!(
            "Speaking utterance {} [{}]: {}",
            id,
            request.language,
            request.text.chars().take(50).collect::<String>()
        );
        self.backend
            .speak(id, request, self.events_tx.clone())
            .map_err(|e| match e {
                WordcastError::Unsupported(_) | WordcastError::DriverError(_) => e,
                other => WordcastError::DriverError(other.to_string()),
            })?;
        self.in_flight = Some(InFlight {
            id,
            quiet_since: None,
        });
        Ok(())
    }

    /// Force-stop the in-flight utterance and drop any deferred one
    pub fn cancel(&mut self, now: Instant) {
        if !self.is_busy() {
            return;
        }
        if let Some(f) = self.in_flight.take() {
            debug!("Force-cancelling utterance {}", f.id);
        }
        if let Some(p) = self.pending.take() {
            debug!("Dropping deferred utterance {}", p.id);
        }
        self.backend.cancel_all();
        self.settle_until = Some(now + self.settle);
    }

    /// Launch a deferred utterance once the settle interval has passed
    pub fn poll(&mut self, now: Instant) -> Option<DriverCompletion> {
        let due = matches!(&self.pending, Some(p) if now >= p.not_before);
        if !due {
            return None;
        }
        let pending = self.pending.take()?;
        match self.launch(pending.id, &pending.request) {
            Ok(()) => Some(DriverCompletion::Started(pending.id)),
            Err(e) => {
                warn!("Deferred utterance {} failed to launch: {}", pending.id, e);
                Some(DriverCompletion::Failed(pending.id, e))
            }
        }
    }

    /// Filter a backend event against the in-flight utterance
    pub fn handle_event(&mut self, event: NarrationEvent) -> Option<DriverCompletion> {
        let current = self.in_flight.as_ref().map(|f| f.id);
        if current != Some(event.utterance) {
            debug!(
                "Dropping stale {:?} for utterance {}",
                event.kind, event.utterance
            );
            return None;
        }

        let id = event.utterance;
        match event.kind {
            NarrationEventKind::Started => Some(DriverCompletion::Started(id)),
            NarrationEventKind::Finished => {
                self.in_flight = None;
                Some(DriverCompletion::Finished(id))
            }
            NarrationEventKind::Failed(msg) => {
                self.in_flight = None;
                Some(DriverCompletion::Failed(id, WordcastError::DriverError(msg)))
            }
            NarrationEventKind::Cancelled => {
                self.in_flight = None;
                Some(DriverCompletion::Cancelled(id))
            }
        }
    }

    /// Give up on an in-flight utterance whose completion never arrived
    pub fn reap_stalled(&mut self, now: Instant) -> Option<UtteranceId> {
        let speaking = self.backend.is_speaking();
        let flight = self.in_flight.as_mut()?;
        if speaking {
            flight.quiet_since = None;
            return None;
        }
        let since = *flight.quiet_since.get_or_insert(now);
        if now.duration_since(since) < self.stall_grace {
            return None;
        }
        let id = flight.id;
        warn!("Utterance {} lost its completion callback", id);
        self.in_flight = None;
        Some(id)
    }

    /// Earliest instant at which `poll` or `reap_stalled` may act
    pub fn next_deadline(&self) -> Option<Instant> {
        let pending = self.pending.as_ref().map(|p| p.not_before);
        let stall = self
            .in_flight
            .as_ref()
            .and_then(|f| f.quiet_since)
            .map(|q| q + self.stall_grace);
        match (pending, stall) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::backends::{RecordingBackend, UnavailableBackend};
    use crate::speech::config::VoiceSettings;
    use crossbeam_channel::{unbounded, Receiver};

    fn driver(backend: RecordingBackend) -> (NarrationDriver, Receiver<NarrationEvent>) {
        let (tx, rx) = unbounded();
        let config = SpeechConfig::default()
            .with_settle_ms(50)
            .with_stall_grace_ms(1000);
        (NarrationDriver::new(Box::new(backend), &config, tx), rx)
    }

    fn request(text: &str) -> NarrationRequest {
        NarrationRequest::new(text, &VoiceSettings::new("en-US"), 1.0)
    }

    #[test]
    fn test_empty_text_is_noop_success() {
        let backend = RecordingBackend::new();
        let (mut driver, _rx) = driver(backend.clone());

        let outcome = driver.speak(request("   "), Instant::now()).unwrap();
        assert_eq!(outcome, SpeakOutcome::Skipped);
        assert!(!driver.is_busy());
        assert!(backend.requests().is_empty());
    }

    #[test]
    fn test_unsupported_backend() {
        let (tx, _rx) = unbounded();
        let mut driver =
            NarrationDriver::new(Box::new(UnavailableBackend), &SpeechConfig::default(), tx);
        let err = driver.speak(request("hello"), Instant::now()).unwrap_err();
        assert!(matches!(err, WordcastError::Unsupported(_)));
    }

    #[test]
    fn test_finish_clears_busy() {
        let backend = RecordingBackend::new();
        let (mut driver, rx) = driver(backend.clone());

        let id = driver
            .speak(request("hello"), Instant::now())
            .unwrap()
            .utterance()
            .unwrap();
        assert!(driver.is_busy());

        let started = rx.try_recv().unwrap();
        assert_eq!(
            driver.handle_event(started),
            Some(DriverCompletion::Started(id))
        );
        assert!(driver.is_busy());

        backend.complete(id);
        let finished = rx.try_recv().unwrap();
        assert_eq!(
            driver.handle_event(finished),
            Some(DriverCompletion::Finished(id))
        );
        assert!(!driver.is_busy());
    }

    #[test]
    fn test_preemption_defers_and_drops_stale_events() {
        let backend = RecordingBackend::new();
        let (mut driver, rx) = driver(backend.clone());
        let t0 = Instant::now();

        let first = driver.speak(request("first"), t0).unwrap().utterance().unwrap();
        let second = driver.speak(request("second"), t0).unwrap();
        assert!(matches!(second, SpeakOutcome::Deferred(_)));
        assert_eq!(backend.cancel_count(), 1);

        // Start and cancellation callbacks for the first utterance arrive late
        let stale: Vec<_> = rx.try_iter().collect();
        assert_eq!(stale.len(), 2);
        for event in stale {
            assert_eq!(event.utterance, first);
            assert_eq!(driver.handle_event(event), None);
        }

        // Not launched before the settle interval
        assert_eq!(driver.poll(t0 + Duration::from_millis(10)), None);
        assert_eq!(backend.texts(), vec!["first"]);

        let launched = driver.poll(t0 + Duration::from_millis(50));
        assert_eq!(
            launched,
            Some(DriverCompletion::Started(second.utterance().unwrap()))
        );
        assert_eq!(backend.texts(), vec!["first", "second"]);
    }

    #[test]
    fn test_reap_stalled_after_grace() {
        let backend = RecordingBackend::new();
        let (mut driver, _rx) = driver(backend.clone());
        let t0 = Instant::now();

        let id = driver.speak(request("lost"), t0).unwrap().utterance().unwrap();
        backend.lose(id);

        assert_eq!(driver.reap_stalled(t0), None);
        assert_eq!(driver.reap_stalled(t0 + Duration::from_millis(500)), None);
        assert_eq!(driver.reap_stalled(t0 + Duration::from_millis(1000)), Some(id));
        assert!(!driver.is_busy());
    }

    #[test]
    fn test_speaking_backend_is_not_reaped() {
        let backend = RecordingBackend::new();
        let (mut driver, _rx) = driver(backend.clone());
        let t0 = Instant::now();

        driver.speak(request("long sentence"), t0).unwrap();
        assert_eq!(driver.reap_stalled(t0 + Duration::from_secs(30)), None);
        assert!(driver.is_busy());
    }

    #[test]
    fn test_failed_deferred_launch_keeps_error_kind() {
        let backend = RecordingBackend::new();
        let (mut driver, _rx) = driver(backend.clone());
        let t0 = Instant::now();

        driver.speak(request("first"), t0).unwrap();
        backend.fail_next_speak(WordcastError::DriverError("engine died".into()));
        let second = driver.speak(request("second"), t0).unwrap();
        let id = second.utterance().unwrap();

        let failed = driver.poll(t0 + Duration::from_millis(50));
        assert_eq!(
            failed,
            Some(DriverCompletion::Failed(
                id,
                WordcastError::DriverError("engine died".into())
            ))
        );
        assert!(!driver.is_busy());
    }

    #[test]
    fn test_unsupported_deferred_launch_stays_unsupported() {
        let backend = RecordingBackend::new();
        let (mut driver, _rx) = driver(backend.clone());
        let t0 = Instant::now();

        driver.speak(request("first"), t0).unwrap();
        backend.fail_next_speak(WordcastError::Unsupported("voice removed".into()));
        driver.speak(request("second"), t0).unwrap();

        let failed = driver.poll(t0 + Duration::from_millis(50));
        assert!(matches!(
            failed,
            Some(DriverCompletion::Failed(_, WordcastError::Unsupported(_)))
        ));
    }

    #[test]
    fn test_backend_failure_event_is_driver_error() {
        let backend = RecordingBackend::new();
        let (mut driver, rx) = driver(backend.clone());

        let id = driver
            .speak(request("hello"), Instant::now())
            .unwrap()
            .utterance()
            .unwrap();
        backend.fail(id, "synthesis crashed");
        let events: Vec<_> = rx.try_iter().collect();
        let completion = events.into_iter().filter_map(|e| driver.handle_event(e)).last();
        assert_eq!(
            completion,
            Some(DriverCompletion::Failed(
                id,
                WordcastError::DriverError("synthesis crashed".into())
            ))
        );
    }
}
