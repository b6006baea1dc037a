//! Narration backends
//!
//! - [`SimulatedBackend`] paces utterances in real time and logs them
//! - [`RecordingBackend`] records requests and completes them on demand
//! - [`UnavailableBackend`] stands in for hosts without speech output

use super::config::NarrationRequest;
use super::driver::{NarrationBackend, NarrationEvent, NarrationEventKind, UtteranceId};
use crate::{Result, WordcastError};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Speaking time per character at rate 1.0
const SIMULATED_MS_PER_CHAR: u64 = 60;

/// Shortest simulated utterance
const SIMULATED_MIN_MS: u64 = 300;

/// Backend that "speaks" by sleeping for a duration derived from text length
///
/// Each utterance runs on its own thread and reports Started/Finished on the
/// event channel. `cancel_all` bumps a generation counter that running
/// utterances poll, so they report Cancelled instead of Finished.
#[derive(Clone, Default)]
pub struct SimulatedBackend {
    generation: Arc<AtomicU64>,
    active: Arc<AtomicUsize>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated duration for a request
    pub fn duration_for(request: &NarrationRequest) -> Duration {
        let chars = request.text.chars().count() as u64;
        let base = (chars * SIMULATED_MS_PER_CHAR).max(SIMULATED_MIN_MS);
        Duration::from_millis((base as f32 / request.rate.max(0.1)) as u64)
    }
}

impl NarrationBackend for SimulatedBackend {
    fn is_available(&self) -> bool {
        true
    }

    fn speak(
        &mut self,
        utterance: UtteranceId,
        request: &NarrationRequest,
        events: Sender<NarrationEvent>,
    ) -> Result<()> {
        let generation = Arc::clone(&self.generation);
        let active = Arc::clone(&self.active);
        let started_in = generation.load(Ordering::SeqCst);
        let duration = Self::duration_for(request);

        info!("🔊 [{}] {}", request.language, request.text);

        active.fetch_add(1, Ordering::SeqCst);
        thread::spawn(move || {
            let _ = events.send(NarrationEvent::new(utterance, NarrationEventKind::Started));

            let step = Duration::from_millis(10);
            let mut elapsed = Duration::ZERO;
            let mut cancelled = false;
            while elapsed < duration {
                if generation.load(Ordering::SeqCst) != started_in {
                    cancelled = true;
                    break;
                }
                thread::sleep(step);
                elapsed += step;
            }

            active.fetch_sub(1, Ordering::SeqCst);
            let kind = if cancelled {
                NarrationEventKind::Cancelled
            } else {
                NarrationEventKind::Finished
            };
            let _ = events.send(NarrationEvent::new(utterance, kind));
        });

        Ok(())
    }

    fn cancel_all(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn is_speaking(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }
}

/// One request seen by a [`RecordingBackend`]
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedUtterance {
    pub id: UtteranceId,
    pub request: NarrationRequest,
}

#[derive(Default)]
struct RecordingInner {
    requests: Vec<RecordedUtterance>,
    outstanding: Vec<(UtteranceId, Sender<NarrationEvent>)>,
    cancel_count: usize,
    unavailable: bool,
    auto_complete: bool,
    speak_failure: Option<WordcastError>,
}

/// Backend that records every request and completes only when told to
///
/// Clones share state, so a test keeps one clone and hands another to the
/// driver. With `auto_complete` it finishes each utterance as soon as it is
/// started, which is what the binary's dry-run mode uses.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    inner: Arc<Mutex<RecordingInner>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_completing() -> Self {
        let backend = Self::new();
        backend.inner.lock().auto_complete = true;
        backend
    }

    pub fn set_available(&self, available: bool) {
        self.inner.lock().unavailable = !available;
    }

    pub fn requests(&self) -> Vec<RecordedUtterance> {
        self.inner.lock().requests.clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.inner
            .lock()
            .requests
            .iter()
            .map(|r| r.request.text.clone())
            .collect()
    }

    pub fn cancel_count(&self) -> usize {
        self.inner.lock().cancel_count
    }

    /// Utterances started but not yet completed
    pub fn outstanding(&self) -> Vec<UtteranceId> {
        self.inner.lock().outstanding.iter().map(|(id, _)| *id).collect()
    }

    /// Finish the oldest outstanding utterance
    pub fn complete_next(&self) -> Option<UtteranceId> {
        let id = self.outstanding().first().copied()?;
        self.complete(id);
        Some(id)
    }

    pub fn complete(&self, id: UtteranceId) {
        self.finish(id, NarrationEventKind::Finished);
    }

    pub fn fail(&self, id: UtteranceId, message: impl Into<String>) {
        self.finish(id, NarrationEventKind::Failed(message.into()));
    }

    /// Forget an utterance without ever reporting its completion
    pub fn lose(&self, id: UtteranceId) {
        self.inner.lock().outstanding.retain(|(o, _)| *o != id);
    }

    /// Make the next `speak` call return `err` instead of starting
    pub fn fail_next_speak(&self, err: WordcastError) {
        self.inner.lock().speak_failure = Some(err);
    }

    fn finish(&self, id: UtteranceId, kind: NarrationEventKind) {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.outstanding.iter().position(|(o, _)| *o == id) {
            let (_, events) = inner.outstanding.remove(pos);
            let _ = events.send(NarrationEvent::new(id, kind));
        }
    }
}

impl NarrationBackend for RecordingBackend {
    fn is_available(&self) -> bool {
        !self.inner.lock().unavailable
    }

    fn speak(
        &mut self,
        utterance: UtteranceId,
        request: &NarrationRequest,
        events: Sender<NarrationEvent>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.speak_failure.take() {
            debug!("Refusing utterance {}: {}", utterance, err);
            return Err(err);
        }
        debug!("Recording utterance {}: {}", utterance, request.text);
        inner.requests.push(RecordedUtterance {
            id: utterance,
            request: request.clone(),
        });
        let _ = events.send(NarrationEvent::new(utterance, NarrationEventKind::Started));
        if inner.auto_complete {
            let _ = events.send(NarrationEvent::new(utterance, NarrationEventKind::Finished));
        } else {
            inner.outstanding.push((utterance, events));
        }
        Ok(())
    }

    fn cancel_all(&mut self) {
        let mut inner = self.inner.lock();
        inner.cancel_count += 1;
        for (id, events) in inner.outstanding.drain(..) {
            let _ = events.send(NarrationEvent::new(id, NarrationEventKind::Cancelled));
        }
    }

    fn is_speaking(&self) -> bool {
        !self.inner.lock().outstanding.is_empty()
    }
}

/// Host without any speech output
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableBackend;

impl NarrationBackend for UnavailableBackend {
    fn is_available(&self) -> bool {
        false
    }

    fn speak(
        &mut self,
        _utterance: UtteranceId,
        _request: &NarrationRequest,
        _events: Sender<NarrationEvent>,
    ) -> Result<()> {
        Err(WordcastError::Unsupported(
            "speech output is not available".into(),
        ))
    }

    fn cancel_all(&mut self) {}

    fn is_speaking(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::config::VoiceSettings;
    use crossbeam_channel::unbounded;
    use uuid::Uuid;

    fn request(text: &str) -> NarrationRequest {
        NarrationRequest::new(text, &VoiceSettings::new("en-US"), 1.0)
    }

    #[test]
    fn test_simulated_duration() {
        assert_eq!(
            SimulatedBackend::duration_for(&request("hi")),
            Duration::from_millis(SIMULATED_MIN_MS)
        );
        let long = request("a much longer sentence");
        let slow = NarrationRequest {
            rate: 0.5,
            ..long.clone()
        };
        assert!(SimulatedBackend::duration_for(&slow) > SimulatedBackend::duration_for(&long));
    }

    #[test]
    fn test_simulated_finishes() {
        let (tx, rx) = unbounded();
        let mut backend = SimulatedBackend::new();
        let id = Uuid::new_v4();
        backend.speak(id, &request("ok"), tx).unwrap();

        let started = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(started.kind, NarrationEventKind::Started);
        let finished = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(finished, NarrationEvent::new(id, NarrationEventKind::Finished));
        assert!(!backend.is_speaking());
    }

    #[test]
    fn test_simulated_cancel() {
        let (tx, rx) = unbounded();
        let mut backend = SimulatedBackend::new();
        let id = Uuid::new_v4();
        backend
            .speak(id, &request("a sentence that takes a while to say"), tx)
            .unwrap();
        let _started = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        backend.cancel_all();

        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.kind, NarrationEventKind::Cancelled);
    }

    #[test]
    fn test_recording_cancel_reports_cancelled() {
        let (tx, rx) = unbounded();
        let recorder = RecordingBackend::new();
        let mut backend = recorder.clone();
        let id = Uuid::new_v4();
        backend.speak(id, &request("hallo"), tx).unwrap();
        assert!(backend.is_speaking());

        backend.cancel_all();
        assert_eq!(recorder.cancel_count(), 1);
        assert!(recorder.outstanding().is_empty());

        let kinds: Vec<_> = rx.try_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![NarrationEventKind::Started, NarrationEventKind::Cancelled]
        );
    }

    #[test]
    fn test_auto_complete() {
        let (tx, rx) = unbounded();
        let mut backend = RecordingBackend::auto_completing();
        backend.speak(Uuid::new_v4(), &request("x"), tx).unwrap();
        assert!(!backend.is_speaking());
        assert_eq!(rx.try_iter().count(), 2);
    }
}
