//! Single-threaded playback engine
//!
//! [`PlaybackController`] owns the authoritative [`PlaybackState`] and every
//! piece that reacts to it: the narration driver, the sequencer, the delay
//! timer, the watchdog and the synchronizer. It never blocks and never reads
//! the clock; callers pass `now` in. The orchestrator thread feeds it
//! commands, narration events and storage notifications, and calls
//! [`PlaybackController::tick`] whenever [`PlaybackController::next_deadline`]
//! passes. Tests drive it the same way with synthetic instants.

use super::cursor::PositionCursor;
use super::machine::{transition, Effect, ListContext, PlaybackAction};
use super::sequencer::{CycleSnapshot, Sequencer, SequencerStep};
use super::session::SessionToken;
use super::state::{PlaybackCommand, PlaybackEvent, PlaybackState, SharedPlaybackState};
use super::watchdog::{Watchdog, WatchdogProbe};
use crate::integration::NarratorConfig;
use crate::playback::PlaybackConfig;
use crate::speech::{DriverCompletion, NarrationDriver, NarrationEvent, SpeakOutcome};
use crate::sync::{StorageChange, Synchronizer};
use crate::vocab::{active_list, PlayableRecord, RecordEdit, RecordId, VocabularyStore};
use crate::{Result, WordcastError};
use crossbeam_channel::{Sender, TrySendError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct PlaybackController {
    config: PlaybackConfig,
    state: PlaybackState,
    last_committed: PlaybackState,
    shared: SharedPlaybackState,
    vocabulary: Arc<dyn VocabularyStore>,
    records: Vec<PlayableRecord>,
    driver: NarrationDriver,
    sequencer: Sequencer,
    watchdog: Watchdog,
    sync: Synchronizer,
    cursor: PositionCursor,
    token: SessionToken,
    delay_until: Option<Instant>,
    event_tx: Sender<PlaybackEvent>,
    unsupported_reported: bool,
}

impl PlaybackController {
    /// Build the engine, seeding the position from persisted state or the cursor
    ///
    /// Playback always starts Idle.
    pub fn new(
        config: &NarratorConfig,
        vocabulary: Arc<dyn VocabularyStore>,
        driver: NarrationDriver,
        sync: Synchronizer,
        cursor: PositionCursor,
        event_tx: Sender<PlaybackEvent>,
    ) -> Self {
        let records = active_list(vocabulary.as_ref(), config.playback.max_active);
        let seeded = sync
            .load()
            .map(|persisted| persisted.current_index)
            .unwrap_or_else(|| cursor.get());
        let index = if records.is_empty() {
            0
        } else {
            seeded.min(records.len() - 1)
        };
        cursor.set(index);

        let state = PlaybackState::at(index);
        let shared = SharedPlaybackState::new();
        shared.replace(state.clone());
        info!(
            "Playback ready at record {} of {} active",
            index,
            records.len()
        );

        Self {
            config: config.playback.clone(),
            last_committed: state.clone(),
            state,
            shared,
            vocabulary,
            records,
            driver,
            sequencer: Sequencer::new(&config.speech, config.playback.field_pause()),
            watchdog: Watchdog::new(config.watchdog.clone()),
            sync,
            cursor,
            token: SessionToken::cancelled(),
            delay_until: None,
            event_tx,
            unsupported_reported: false,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Handle that stays in step with every committed state
    pub fn shared_state(&self) -> SharedPlaybackState {
        self.shared.clone()
    }

    /// Active list as last read from the store
    pub fn records(&self) -> &[PlayableRecord] {
        &self.records
    }

    pub fn current_token(&self) -> &SessionToken {
        &self.token
    }

    pub fn handle_command(&mut self, command: PlaybackCommand, now: Instant) {
        debug!("Playback command: {:?}", command);
        if command != PlaybackCommand::Shutdown {
            self.sync_list(now);
        }

        match command {
            PlaybackCommand::PlayPause => {
                if self.state.is_playing {
                    self.dispatch(PlaybackAction::Pause, now);
                } else if !self.driver.is_available() {
                    self.report_unsupported(WordcastError::Unsupported(
                        "no speech backend available".into(),
                    ));
                } else if self.records.is_empty() {
                    info!("Nothing to play: the active list is empty");
                } else {
                    self.dispatch(PlaybackAction::Resume, now);
                }
            }
            PlaybackCommand::Pause => self.dispatch(PlaybackAction::Pause, now),
            PlaybackCommand::Stop => self.dispatch(PlaybackAction::Stop, now),
            PlaybackCommand::Next => self.dispatch(PlaybackAction::Advance, now),
            PlaybackCommand::Prev => self.dispatch(PlaybackAction::Retreat, now),
            PlaybackCommand::GoToFirst => self.dispatch(PlaybackAction::JumpFirst, now),
            PlaybackCommand::MarkCurrentLearned => {
                self.remove_current(now, |store, id| store.mark_learned(id));
            }
            PlaybackCommand::DeleteCurrent => {
                self.remove_current(now, |store, id| store.delete_record(id));
            }
            PlaybackCommand::OpenEditor => self.dispatch(PlaybackAction::OpenEditor, now),
            PlaybackCommand::CloseEditor => self.dispatch(PlaybackAction::CloseEditor, now),
            PlaybackCommand::SaveEdit(edit) => self.save_edit(edit, now),
            PlaybackCommand::SetPosition(index) => {
                self.dispatch(PlaybackAction::ExternalPosition(index), now);
                // A rejected position must not leave the cursor past the list
                if self.cursor.get() != self.state.current_index {
                    debug!(
                        "Position {} rejected, cursor back at {}",
                        index, self.state.current_index
                    );
                    self.cursor.set(self.state.current_index);
                }
            }
            PlaybackCommand::Shutdown => self.shutdown(now),
        }
    }

    /// Route a backend event through the driver's stale filter
    pub fn handle_narration(&mut self, event: NarrationEvent, now: Instant) {
        let Some(completion) = self.driver.handle_event(event) else {
            return;
        };
        self.handle_completion(completion, now);
    }

    fn handle_completion(&mut self, completion: DriverCompletion, now: Instant) {
        match completion {
            DriverCompletion::Started(id) => {
                debug!("Utterance {} started", id);
            }
            DriverCompletion::Finished(id) => {
                if self.sequencer.awaiting(id) {
                    let step = self.sequencer.field_done(now, &self.token, &self.state);
                    self.run_step(step, now);
                }
            }
            DriverCompletion::Cancelled(id) => {
                if self.sequencer.awaiting(id) {
                    debug!("Utterance {} was cancelled outside the player", id);
                    self.sequencer.abandon();
                    self.mark_cycle_lost(now);
                }
            }
            DriverCompletion::Failed(id, err) => {
                if self.sequencer.awaiting(id) {
                    self.sequencer.abandon();
                    self.fail(err, now);
                } else {
                    debug!("Ignoring failure of unawaited utterance {}: {}", id, err);
                }
            }
        }
    }

    /// Adopt a sibling's broadcast
    pub fn handle_storage_change(&mut self, change: StorageChange, now: Instant) {
        let Some(message) = self.sync.decode(&change) else {
            return;
        };
        debug!("Adopting remote playback state {:?}", message);
        self.refresh_records();
        self.apply(PlaybackAction::RemoteUpdate(message), now, false);
    }

    /// Fire every timer that is due
    pub fn tick(&mut self, now: Instant) {
        if let Some(completion) = self.driver.poll(now) {
            self.handle_completion(completion, now);
        }

        if let Some(id) = self.driver.reap_stalled(now) {
            if self.sequencer.awaiting(id) {
                self.sequencer.abandon();
                self.mark_cycle_lost(now);
            }
        }

        if let Some(step) = self.sequencer.resume_due(now, &self.token, &self.state) {
            self.run_step(step, now);
        }

        if matches!(self.delay_until, Some(until) if now >= until) {
            self.delay_until = None;
            self.dispatch(PlaybackAction::DelayElapsed, now);
        }

        let probe = self.probe();
        if self.watchdog.poll(now, probe) {
            self.mark_cycle_lost(now);
            self.start_cycle(now);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.driver.next_deadline(),
            self.sequencer.next_deadline(),
            self.delay_until,
            self.watchdog.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Cancel everything and go Idle without telling siblings
    pub fn shutdown(&mut self, now: Instant) {
        info!("Playback shutting down");
        self.cancel_session(now);
        self.watchdog.disarm();
        self.state.stop_all();
        self.commit(now, false);
        self.emit(PlaybackEvent::Shutdown);
    }

    fn probe(&self) -> WatchdogProbe {
        WatchdogProbe {
            is_playing: self.state.is_playing,
            driver_busy: self.driver.is_busy(),
            cycle_running: self.sequencer.is_running(&self.token),
            delay_armed: self.delay_until.is_some(),
            token_cancelled: self.token.is_cancelled(),
        }
    }

    fn list_context(&self) -> ListContext {
        ListContext {
            len: self.records.len(),
            repeat_count: self.config.repeat_count,
            end_of_list: self.config.end_of_list,
        }
    }

    fn refresh_records(&mut self) {
        self.records = active_list(self.vocabulary.as_ref(), self.config.max_active);
    }

    /// Re-read the store and reconcile the position with its length
    fn sync_list(&mut self, now: Instant) {
        let before = self.records.len();
        self.refresh_records();
        if self.records.len() != before {
            debug!("Active list changed: {} -> {}", before, self.records.len());
            self.dispatch(PlaybackAction::ListChanged, now);
        }
    }

    fn dispatch(&mut self, action: PlaybackAction, now: Instant) {
        self.apply(action, now, true);
    }

    fn apply(&mut self, action: PlaybackAction, now: Instant, publish: bool) {
        let t = transition(&self.state, &action, &self.list_context());
        self.state = t.state;
        for effect in t.effects {
            self.apply_effect(effect, now);
        }
        self.commit(now, publish);
    }

    fn apply_effect(&mut self, effect: Effect, now: Instant) {
        match effect {
            Effect::CancelSession => self.cancel_session(now),
            Effect::BeginSession => {
                self.token = SessionToken::new();
                debug!("Session {} begins", self.token.id());
            }
            Effect::Narrate => self.start_cycle(now),
            Effect::StartDelay => {
                self.delay_until = Some(now + self.config.inter_record_delay());
            }
        }
    }

    fn cancel_session(&mut self, now: Instant) {
        self.token.cancel();
        self.driver.cancel(now);
        self.sequencer.abandon();
        if self.delay_until.take().is_some() {
            debug!("{}", WordcastError::DelayInterrupted);
        }
    }

    /// Persist, broadcast and announce the state if it changed
    fn commit(&mut self, now: Instant, publish: bool) {
        if !self.state.is_in_delay {
            self.delay_until = None;
        } else if self.state.is_playing && self.delay_until.is_none() {
            self.delay_until = Some(now + self.config.inter_record_delay());
        }

        if self.state.is_playing {
            self.watchdog.arm(now);
        } else {
            self.watchdog.disarm();
        }

        if self.state == self.last_committed {
            return;
        }
        let previous = std::mem::replace(&mut self.last_committed, self.state.clone());

        if previous.current_index != self.state.current_index {
            self.cursor.set(self.state.current_index);
        }
        if publish && !previous.same_shared_fields(&self.state) {
            if let Err(e) = self.sync.publish(&self.state) {
                warn!("Failed to publish playback state: {}", e);
            }
        }
        self.shared.replace(self.state.clone());

        debug!(
            "{} -> {} (record {}, repeat {})",
            previous.macro_state(),
            self.state.macro_state(),
            self.state.current_index,
            self.state.current_repeat
        );
        if previous.is_playing && !self.state.is_playing {
            self.emit(PlaybackEvent::Stopped {
                index: self.state.current_index,
            });
        }
        self.emit(PlaybackEvent::StateChanged(self.state.clone()));
    }

    /// Run the sequencer for the current record unless a cycle already runs
    fn start_cycle(&mut self, now: Instant) {
        if !self.state.is_playing || self.token.is_cancelled() {
            return;
        }
        if self.sequencer.is_running(&self.token) {
            debug!("Narration cycle already running for this session");
            return;
        }

        self.refresh_records();
        let index = self.state.current_index;
        let Some(record) = self.records.get(index).cloned() else {
            // Clamps or stops, restarting narration when still playing
            self.dispatch(PlaybackAction::ListChanged, now);
            return;
        };

        self.dispatch(PlaybackAction::CycleStarted, now);
        let step = self
            .sequencer
            .begin(self.token.clone(), CycleSnapshot::of(&self.state), &record);
        self.run_step(step, now);
    }

    fn run_step(&mut self, mut step: SequencerStep, now: Instant) {
        loop {
            match step {
                SequencerStep::Speak { field, request } => {
                    let text = request.text.clone();
                    match self.driver.speak(request, now) {
                        Ok(SpeakOutcome::Skipped) => {
                            debug!("Nothing to say for {} field", field);
                            step = self.sequencer.field_done(now, &self.token, &self.state);
                        }
                        Ok(outcome) => {
                            if let Some(id) = outcome.utterance() {
                                self.sequencer.attach(id);
                            }
                            self.emit(PlaybackEvent::Narrating {
                                index: self.state.current_index,
                                field,
                                text,
                            });
                            return;
                        }
                        Err(e) => {
                            self.sequencer.abandon();
                            self.fail(e, now);
                            return;
                        }
                    }
                }
                SequencerStep::Pause { .. } => return,
                SequencerStep::Complete => {
                    self.emit(PlaybackEvent::CycleComplete {
                        index: self.state.current_index,
                        repeat: self.state.current_repeat,
                    });
                    self.dispatch(PlaybackAction::SequenceStepComplete, now);
                    return;
                }
                SequencerStep::Aborted => {
                    debug!("Narration cycle superseded");
                    self.mark_cycle_lost(now);
                    return;
                }
            }
        }
    }

    /// The cycle is gone without a result; clear the speaking flag
    fn mark_cycle_lost(&mut self, now: Instant) {
        if self.state.is_speaking {
            self.dispatch(PlaybackAction::NarrationLost, now);
        }
    }

    fn fail(&mut self, err: WordcastError, now: Instant) {
        if err.is_benign() {
            debug!("Absorbed: {}", err);
            return;
        }
        if matches!(err, WordcastError::Unsupported(_)) {
            self.dispatch(PlaybackAction::Stop, now);
            self.report_unsupported(err);
            return;
        }
        error!("Narration failed at record {}: {}", self.state.current_index, err);
        self.dispatch(PlaybackAction::NarrationFailed, now);
        self.emit(PlaybackEvent::Error(err));
    }

    fn report_unsupported(&mut self, err: WordcastError) {
        if self.unsupported_reported {
            return;
        }
        self.unsupported_reported = true;
        error!("{}", err);
        self.emit(PlaybackEvent::Error(err));
    }

    fn current_record_id(&self) -> Option<RecordId> {
        self.records.get(self.state.current_index).map(|r| r.id)
    }

    fn remove_current<F>(&mut self, now: Instant, remove: F)
    where
        F: FnOnce(&dyn VocabularyStore, RecordId) -> Result<()>,
    {
        let Some(id) = self.current_record_id() else {
            debug!("No current record to remove");
            return;
        };
        if let Err(e) = remove(self.vocabulary.as_ref(), id) {
            warn!("Failed to remove record {}: {}", id, e);
            self.emit(PlaybackEvent::Error(e));
            return;
        }
        self.refresh_records();
        self.dispatch(PlaybackAction::RecordRemoved, now);
    }

    fn save_edit(&mut self, edit: RecordEdit, now: Instant) {
        let Some(id) = self.current_record_id() else {
            debug!("No current record to edit");
            return;
        };
        if let Err(e) = self.vocabulary.edit_record(id, edit) {
            warn!("Failed to edit record {}: {}", id, e);
            self.emit(PlaybackEvent::Error(e));
            return;
        }
        self.refresh_records();
        self.dispatch(PlaybackAction::CloseEditor, now);
    }

    fn emit(&self, event: PlaybackEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("Event channel full, dropping {:?}", event);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
