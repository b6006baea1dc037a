//! Deterministic harness around a `PlaybackController`
//!
//! Time only moves when a test calls `advance`, and utterances only finish
//! when a test says so through the recording backend.

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wordcast::integration::NarratorConfig;
use wordcast::playback::{
    PlaybackCommand, PlaybackConfig, PlaybackController, PlaybackEvent, PlaybackState,
    PositionCursor,
};
use wordcast::speech::{NarrationDriver, NarrationEvent, RecordingBackend, SpeechConfig};
use wordcast::sync::{SharedStorage, StorageChange, SyncMessage, Synchronizer};
use wordcast::vocab::{InMemoryVocabulary, PlayableRecord};

pub struct Narrator {
    pub controller: PlaybackController,
    pub backend: RecordingBackend,
    pub vocabulary: InMemoryVocabulary,
    pub cursor: PositionCursor,
    pub now: Instant,
    narration_rx: Receiver<NarrationEvent>,
    events_rx: Receiver<PlaybackEvent>,
    storage_rx: Receiver<StorageChange>,
    events: Vec<PlaybackEvent>,
}

pub fn words(pairs: &[(&str, &str)]) -> Vec<PlayableRecord> {
    pairs
        .iter()
        .map(|(foreign, translation)| PlayableRecord::new(*foreign, *translation))
        .collect()
}

pub fn narrator_config(playback: PlaybackConfig) -> NarratorConfig {
    NarratorConfig::default()
        .with_playback(playback)
        .with_speech(
            SpeechConfig::default()
                .with_settle_ms(50)
                .with_stall_grace_ms(1000),
        )
}

impl Narrator {
    pub fn new(records: Vec<PlayableRecord>, config: NarratorConfig) -> Self {
        Self::on_storage(&SharedStorage::new(), records, config)
    }

    /// An instance connected to `storage`, sharing it with any siblings
    pub fn on_storage(
        storage: &SharedStorage,
        records: Vec<PlayableRecord>,
        config: NarratorConfig,
    ) -> Self {
        Self::build(
            storage,
            InMemoryVocabulary::with_records(records),
            PositionCursor::new(0),
            config,
            Instant::now(),
        )
    }

    pub fn build(
        storage: &SharedStorage,
        vocabulary: InMemoryVocabulary,
        cursor: PositionCursor,
        config: NarratorConfig,
        now: Instant,
    ) -> Self {
        let backend = RecordingBackend::new();
        let (narration_tx, narration_rx) = unbounded();
        let driver = NarrationDriver::new(Box::new(backend.clone()), &config.speech, narration_tx);
        let sync = Synchronizer::new(Arc::new(storage.connect()));
        let storage_rx = sync.changes();
        let (event_tx, events_rx) = unbounded();
        let controller = PlaybackController::new(
            &config,
            Arc::new(vocabulary.clone()),
            driver,
            sync,
            cursor.clone(),
            event_tx,
        );
        Self {
            controller,
            backend,
            vocabulary,
            cursor,
            now,
            narration_rx,
            events_rx,
            storage_rx,
            events: Vec::new(),
        }
    }

    pub fn command(&mut self, command: PlaybackCommand) {
        self.controller.handle_command(command, self.now);
        self.pump();
    }

    /// Deliver pending narration callbacks and collect emitted events
    pub fn pump(&mut self) {
        while let Ok(event) = self.narration_rx.try_recv() {
            self.controller.handle_narration(event, self.now);
        }
        self.events.extend(self.events_rx.try_iter());
    }

    /// Deliver broadcasts from sibling instances
    pub fn pump_storage(&mut self) -> usize {
        let changes: Vec<_> = self.storage_rx.try_iter().collect();
        let count = changes.len();
        for change in changes {
            self.controller.handle_storage_change(change, self.now);
        }
        self.pump();
        count
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
        self.controller.tick(self.now);
        self.pump();
    }

    /// Finish the oldest outstanding utterance
    pub fn finish(&mut self) {
        assert!(self.backend.complete_next().is_some(), "nothing is being spoken");
        self.pump();
    }

    /// Let narration run: finish whatever is spoken, otherwise let time pass
    pub fn step(&mut self) {
        if self.backend.outstanding().is_empty() {
            self.advance(Duration::from_millis(50));
        } else {
            self.finish();
        }
    }

    pub fn run_until(&mut self, max_steps: usize, mut done: impl FnMut(&Narrator) -> bool) {
        for _ in 0..max_steps {
            if done(self) {
                return;
            }
            self.step();
        }
        panic!("condition not reached within {} steps", max_steps);
    }

    pub fn state(&self) -> PlaybackState {
        self.controller.state().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.backend.texts()
    }

    pub fn events(&self) -> &[PlaybackEvent] {
        &self.events
    }

    pub fn cycle_completions(&self) -> Vec<(usize, u32)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::CycleComplete { index, repeat } => Some((*index, *repeat)),
                _ => None,
            })
            .collect()
    }
}

/// Decode everything a listening instance has received
pub fn broadcasts(rx: &Receiver<StorageChange>) -> Vec<SyncMessage> {
    rx.try_iter()
        .filter_map(|change| SyncMessage::from_json(&change.value).ok())
        .collect()
}
