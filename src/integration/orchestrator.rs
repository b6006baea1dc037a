//! Orchestrator thread for the narrator
//!
//! The orchestrator owns a [`PlaybackController`] and runs it on one thread,
//! multiplexing three inputs with `select!`:
//! - Commands from the UI or tests
//! - Narration events from the speech backend
//! - State broadcasts from sibling instances
//!
//! Between inputs it wakes at the controller's next deadline so pauses,
//! delays and the watchdog fire on time. Callers talk to it through an
//! [`OrchestratorHandle`] and can query state through [`SharedPlaybackState`].

use super::config::NarratorConfig;
use crate::playback::{
    PlaybackCommand, PlaybackController, PlaybackEvent, PositionCursor, SharedPlaybackState,
};
use crate::speech::{NarrationBackend, NarrationDriver, NarrationEvent};
use crate::sync::{StateStore, StorageChange, Synchronizer};
use crate::vocab::{RecordEdit, VocabularyStore};
use crate::{Result, WordcastError};
use crossbeam_channel::{bounded, never, select, unbounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest the loop sleeps when nothing is scheduled
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Handle for controlling the orchestrator from the UI or tests
pub struct OrchestratorHandle {
    command_tx: Sender<PlaybackCommand>,
    event_rx: Receiver<PlaybackEvent>,
    state: SharedPlaybackState,
    cursor: PositionCursor,
}

impl OrchestratorHandle {
    /// Send a command to the orchestrator
    pub fn send_command(&self, cmd: PlaybackCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| WordcastError::Channel(format!("Failed to send command: {}", e)))
    }

    pub fn play_pause(&self) -> Result<()> {
        self.send_command(PlaybackCommand::PlayPause)
    }

    pub fn pause(&self) -> Result<()> {
        self.send_command(PlaybackCommand::Pause)
    }

    /// Stop regardless of state
    pub fn stop(&self) -> Result<()> {
        self.send_command(PlaybackCommand::Stop)
    }

    pub fn next(&self) -> Result<()> {
        self.send_command(PlaybackCommand::Next)
    }

    pub fn prev(&self) -> Result<()> {
        self.send_command(PlaybackCommand::Prev)
    }

    pub fn go_to_first(&self) -> Result<()> {
        self.send_command(PlaybackCommand::GoToFirst)
    }

    pub fn mark_current_learned(&self) -> Result<()> {
        self.send_command(PlaybackCommand::MarkCurrentLearned)
    }

    pub fn delete_current_entry(&self) -> Result<()> {
        self.send_command(PlaybackCommand::DeleteCurrent)
    }

    /// Open the editor for the current record (pauses playback)
    pub fn open_editor(&self) -> Result<()> {
        self.send_command(PlaybackCommand::OpenEditor)
    }

    pub fn close_editor(&self) -> Result<()> {
        self.send_command(PlaybackCommand::CloseEditor)
    }

    pub fn save_edit(&self, edit: RecordEdit) -> Result<()> {
        self.send_command(PlaybackCommand::SaveEdit(edit))
    }

    /// Outside navigation moved to `index`
    pub fn set_position(&self, index: usize) -> Result<()> {
        self.cursor.set(index);
        self.send_command(PlaybackCommand::SetPosition(index))
    }

    /// Request shutdown
    pub fn shutdown(&self) -> Result<()> {
        self.send_command(PlaybackCommand::Shutdown)
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<PlaybackEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<PlaybackEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Get the shared playback state
    ///
    /// This can be used to query state directly without events.
    pub fn state(&self) -> &SharedPlaybackState {
        &self.state
    }

    pub fn cursor(&self) -> &PositionCursor {
        &self.cursor
    }

    // === Convenience state query methods ===

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn current_index(&self) -> usize {
        self.state.current_index()
    }
}

pub struct Orchestrator {
    controller: PlaybackController,
    command_rx: Receiver<PlaybackCommand>,
    narration_rx: Receiver<NarrationEvent>,
    storage_rx: Receiver<StorageChange>,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// Returns the orchestrator and a handle for controlling it.
    /// The orchestrator must be started with `start()` to begin processing.
    pub fn new(
        config: NarratorConfig,
        vocabulary: Arc<dyn VocabularyStore>,
        backend: Box<dyn NarrationBackend>,
        storage: Arc<dyn StateStore>,
        cursor: PositionCursor,
    ) -> Result<(Self, OrchestratorHandle)> {
        config.validate()?;
        let buffer_size = config.channel_buffer_size;

        let (command_tx, command_rx) = bounded(buffer_size);
        let (event_tx, event_rx) = bounded(buffer_size);
        // Backends report from their own threads and must never block
        let (narration_tx, narration_rx) = unbounded();

        let driver = NarrationDriver::new(backend, &config.speech, narration_tx);
        let sync = Synchronizer::new(storage);
        let storage_rx = sync.changes();

        let controller =
            PlaybackController::new(&config, vocabulary, driver, sync, cursor.clone(), event_tx);

        let handle = OrchestratorHandle {
            command_tx,
            event_rx,
            state: controller.shared_state(),
            cursor,
        };

        let orchestrator = Self {
            controller,
            command_rx,
            narration_rx,
            storage_rx,
        };

        Ok((orchestrator, handle))
    }

    /// Spawn the orchestration thread
    pub fn start(self) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("wordcast-orchestrator".into())
            .spawn(move || self.run())?;
        info!("Orchestrator loop started");
        Ok(handle)
    }

    fn run(mut self) {
        info!("Orchestrator main loop starting");
        let command_rx = self.command_rx.clone();
        let narration_rx = self.narration_rx.clone();
        let mut storage_rx = self.storage_rx.clone();

        loop {
            let timeout = self
                .controller
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_POLL)
                .min(IDLE_POLL);

            select! {
                recv(command_rx) -> cmd => {
                    match cmd {
                        Ok(PlaybackCommand::Shutdown) => {
                            info!("Shutdown requested");
                            self.controller
                                .handle_command(PlaybackCommand::Shutdown, Instant::now());
                            break;
                        }
                        Ok(cmd) => self.controller.handle_command(cmd, Instant::now()),
                        Err(_) => {
                            warn!("Command channel disconnected");
                            self.controller.shutdown(Instant::now());
                            break;
                        }
                    }
                }

                recv(narration_rx) -> event => {
                    if let Ok(event) = event {
                        self.controller.handle_narration(event, Instant::now());
                    }
                }

                recv(storage_rx) -> change => {
                    match change {
                        Ok(change) => self.controller.handle_storage_change(change, Instant::now()),
                        Err(_) => {
                            debug!("Storage notifications closed");
                            storage_rx = never();
                        }
                    }
                }

                default(timeout) => {}
            }

            self.controller.tick(Instant::now());
        }

        info!("Orchestrator main loop exiting");
    }
}
