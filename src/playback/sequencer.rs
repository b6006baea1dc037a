//! Field-by-field narration of one record
//!
//! A cycle speaks the translation, pauses, speaks the foreign term, pauses and
//! then speaks the tip if the record has one. The sequencer never touches the
//! driver itself; it hands back [`SequencerStep`]s and the controller performs
//! them. Every time the controller comes back after a suspension point the
//! cycle re-checks its session token and the `(index, repeat, is_playing)`
//! snapshot taken when it began. A mismatch ends the cycle as
//! [`SequencerStep::Aborted`], which is a quiet supersession and not an error.

use super::session::SessionToken;
use super::state::PlaybackState;
use crate::speech::{NarrationRequest, SpeechConfig, UtteranceId};
use crate::vocab::PlayableRecord;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationField {
    Translation,
    Foreign,
    Tip,
}

impl std::fmt::Display for NarrationField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NarrationField::Translation => write!(f, "translation"),
            NarrationField::Foreign => write!(f, "foreign"),
            NarrationField::Tip => write!(f, "tip"),
        }
    }
}

/// Live state a cycle must still match to keep going
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleSnapshot {
    pub index: usize,
    pub repeat: u32,
    pub is_playing: bool,
}

impl CycleSnapshot {
    pub fn of(state: &PlaybackState) -> Self {
        Self {
            index: state.current_index,
            repeat: state.current_repeat,
            is_playing: state.is_playing,
        }
    }
}

/// What the controller should do next for the running cycle
#[derive(Clone, Debug, PartialEq)]
pub enum SequencerStep {
    Speak {
        field: NarrationField,
        request: NarrationRequest,
    },
    /// Call [`Sequencer::resume_due`] at or after `until`
    Pause { until: Instant },
    /// Every field was narrated
    Complete,
    /// Superseded; the cycle is gone
    Aborted,
}

struct Cycle {
    token: SessionToken,
    snapshot: CycleSnapshot,
    fields: Vec<(NarrationField, NarrationRequest)>,
    next_field: usize,
    awaiting: Option<UtteranceId>,
    resume_at: Option<Instant>,
}

pub struct Sequencer {
    config: SpeechConfig,
    field_pause: Duration,
    cycle: Option<Cycle>,
}

impl Sequencer {
    pub fn new(config: &SpeechConfig, field_pause: Duration) -> Self {
        Self {
            config: config.clone(),
            field_pause,
            cycle: None,
        }
    }

    fn requests_for(&self, record: &PlayableRecord) -> Vec<(NarrationField, NarrationRequest)> {
        let rate = self.config.effective_rate();
        let mut fields = vec![
            (
                NarrationField::Translation,
                NarrationRequest::new(&record.translation_text, &self.config.translation, rate),
            ),
            (
                NarrationField::Foreign,
                NarrationRequest::new(&record.foreign_text, &self.config.foreign, rate),
            ),
        ];
        if let Some(tip) = record.tip() {
            fields.push((
                NarrationField::Tip,
                NarrationRequest::new(tip, &self.config.tip, rate),
            ));
        }
        fields
    }

    /// Start a cycle for `record`, replacing any cycle still held
    pub fn begin(
        &mut self,
        token: SessionToken,
        snapshot: CycleSnapshot,
        record: &PlayableRecord,
    ) -> SequencerStep {
        if self.cycle.is_some() {
            debug!("Replacing unfinished narration cycle");
        }
        debug!(
            "Narration cycle for record {} (repeat {})",
            snapshot.index, snapshot.repeat
        );
        self.cycle = Some(Cycle {
            token,
            snapshot,
            fields: self.requests_for(record),
            next_field: 0,
            awaiting: None,
            resume_at: None,
        });
        self.speak_next()
    }

    fn speak_next(&mut self) -> SequencerStep {
        let Some(cycle) = self.cycle.as_mut() else {
            return SequencerStep::Aborted;
        };
        match cycle.fields.get(cycle.next_field).cloned() {
            Some((field, request)) => {
                cycle.next_field += 1;
                SequencerStep::Speak { field, request }
            }
            None => {
                self.cycle = None;
                SequencerStep::Complete
            }
        }
    }

    /// Remember which utterance the current field is waiting on
    pub fn attach(&mut self, utterance: UtteranceId) {
        if let Some(cycle) = self.cycle.as_mut() {
            cycle.awaiting = Some(utterance);
        }
    }

    /// Whether the running cycle is waiting on `utterance`
    pub fn awaiting(&self, utterance: UtteranceId) -> bool {
        self.cycle
            .as_ref()
            .is_some_and(|c| c.awaiting == Some(utterance))
    }

    fn still_valid(&self, current: &SessionToken, live: &PlaybackState) -> bool {
        self.cycle.as_ref().is_some_and(|c| {
            c.token.is_current(current) && c.snapshot == CycleSnapshot::of(live)
        })
    }

    /// The awaited field finished (or had nothing to say)
    pub fn field_done(
        &mut self,
        now: Instant,
        current: &SessionToken,
        live: &PlaybackState,
    ) -> SequencerStep {
        if !self.still_valid(current, live) {
            self.abandon();
            return SequencerStep::Aborted;
        }
        let Some(cycle) = self.cycle.as_mut() else {
            return SequencerStep::Aborted;
        };
        cycle.awaiting = None;
        if cycle.next_field >= cycle.fields.len() {
            self.cycle = None;
            return SequencerStep::Complete;
        }
        let until = now + self.field_pause;
        cycle.resume_at = Some(until);
        SequencerStep::Pause { until }
    }

    /// Continue after an inter-field pause; `None` until the pause is over
    pub fn resume_due(
        &mut self,
        now: Instant,
        current: &SessionToken,
        live: &PlaybackState,
    ) -> Option<SequencerStep> {
        let until = self.cycle.as_ref()?.resume_at?;
        if now < until {
            return None;
        }
        if !self.still_valid(current, live) {
            self.abandon();
            return Some(SequencerStep::Aborted);
        }
        if let Some(cycle) = self.cycle.as_mut() {
            cycle.resume_at = None;
        }
        Some(self.speak_next())
    }

    /// A cycle for `current` is speaking or pausing
    pub fn is_running(&self, current: &SessionToken) -> bool {
        self.cycle
            .as_ref()
            .is_some_and(|c| c.token.is_current(current))
    }

    /// Any cycle is held, current or not
    pub fn has_cycle(&self) -> bool {
        self.cycle.is_some()
    }

    pub fn abandon(&mut self) {
        if let Some(cycle) = self.cycle.take() {
            debug!("Abandoning narration cycle for record {}", cycle.snapshot.index);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.cycle.as_ref().and_then(|c| c.resume_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn playing(index: usize) -> PlaybackState {
        PlaybackState {
            is_playing: true,
            is_speaking: true,
            ..PlaybackState::at(index)
        }
    }

    fn sequencer() -> Sequencer {
        Sequencer::new(&SpeechConfig::default(), Duration::from_millis(100))
    }

    fn spoken(step: &SequencerStep) -> (NarrationField, String) {
        match step {
            SequencerStep::Speak { field, request } => (*field, request.text.clone()),
            other => panic!("expected Speak, got {:?}", other),
        }
    }

    #[test]
    fn test_field_order_with_tip() {
        let mut seq = sequencer();
        let token = SessionToken::new();
        let live = playing(0);
        let record = PlayableRecord::new("der Hund", "the dog").with_tip("masculine");
        let t0 = Instant::now();

        let step = seq.begin(token.clone(), CycleSnapshot::of(&live), &record);
        assert_eq!(spoken(&step), (NarrationField::Translation, "the dog".into()));
        seq.attach(Uuid::new_v4());

        let pause = seq.field_done(t0, &token, &live);
        assert_eq!(
            pause,
            SequencerStep::Pause {
                until: t0 + Duration::from_millis(100)
            }
        );
        assert_eq!(seq.resume_due(t0, &token, &live), None);

        let step = seq
            .resume_due(t0 + Duration::from_millis(100), &token, &live)
            .unwrap();
        assert_eq!(spoken(&step), (NarrationField::Foreign, "der Hund".into()));

        let t1 = t0 + Duration::from_millis(500);
        seq.field_done(t1, &token, &live);
        let step = seq
            .resume_due(t1 + Duration::from_millis(100), &token, &live)
            .unwrap();
        assert_eq!(spoken(&step), (NarrationField::Tip, "masculine".into()));

        assert_eq!(seq.field_done(t1, &token, &live), SequencerStep::Complete);
        assert!(!seq.has_cycle());
    }

    #[test]
    fn test_no_tip_completes_after_foreign() {
        let mut seq = sequencer();
        let token = SessionToken::new();
        let live = playing(0);
        let t0 = Instant::now();

        seq.begin(token.clone(), CycleSnapshot::of(&live), &PlayableRecord::new("ja", "yes"));
        seq.field_done(t0, &token, &live);
        seq.resume_due(t0 + Duration::from_secs(1), &token, &live);
        assert_eq!(seq.field_done(t0, &token, &live), SequencerStep::Complete);
    }

    #[test]
    fn test_voices_follow_fields() {
        let config = SpeechConfig::default().with_rate(1.5);
        let mut seq = Sequencer::new(&config, Duration::ZERO);
        let token = SessionToken::new();
        let live = playing(0);

        match seq.begin(token, CycleSnapshot::of(&live), &PlayableRecord::new("Katze", "cat")) {
            SequencerStep::Speak { request, .. } => {
                assert_eq!(request.language, config.translation.language);
                assert_eq!(request.rate, 1.5);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_position_change_aborts_cycle() {
        let mut seq = sequencer();
        let token = SessionToken::new();
        let t0 = Instant::now();
        seq.begin(token.clone(), CycleSnapshot::of(&playing(0)), &PlayableRecord::new("a", "b"));

        let mut moved = playing(2);
        moved.is_speaking = false;
        assert_eq!(seq.field_done(t0, &token, &moved), SequencerStep::Aborted);
        assert!(!seq.is_running(&token));
    }

    #[test]
    fn test_cancelled_token_aborts_after_pause() {
        let mut seq = sequencer();
        let token = SessionToken::new();
        let live = playing(1);
        let t0 = Instant::now();
        seq.begin(token.clone(), CycleSnapshot::of(&live), &PlayableRecord::new("a", "b"));
        seq.field_done(t0, &token, &live);

        token.cancel();
        assert_eq!(
            seq.resume_due(t0 + Duration::from_secs(1), &token, &live),
            Some(SequencerStep::Aborted)
        );
    }

    #[test]
    fn test_stale_session_is_not_running() {
        let mut seq = sequencer();
        let old = SessionToken::new();
        seq.begin(old, CycleSnapshot::of(&playing(0)), &PlayableRecord::new("a", "b"));
        assert!(!seq.is_running(&SessionToken::new()));
        assert!(seq.has_cycle());
    }

    #[test]
    fn test_awaiting_tracks_attached_utterance() {
        let mut seq = sequencer();
        let token = SessionToken::new();
        seq.begin(token, CycleSnapshot::of(&playing(0)), &PlayableRecord::new("a", "b"));
        let id = Uuid::new_v4();
        seq.attach(id);
        assert!(seq.awaiting(id));
        assert!(!seq.awaiting(Uuid::new_v4()));
    }
}
