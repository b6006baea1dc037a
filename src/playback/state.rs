//! Playback state shared between the orchestrator and its callers
//!
//! The orchestrator thread owns the authoritative [`PlaybackState`] and mirrors
//! every committed change into a [`SharedPlaybackState`] that handles, UIs and
//! tests can query without going through the command channel.
//!
//! The design separates:
//! - **State**: flags and position, queryable synchronously
//! - **Commands**: requests to change state (sent to the orchestrator)
//! - **Events**: notifications for UI updates

use super::sequencer::NarrationField;
use crate::vocab::RecordEdit;
use crate::WordcastError;
use parking_lot::RwLock;
use std::sync::Arc;

/// Named combination of the orthogonal status flags
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MacroState {
    /// Not playing
    #[default]
    Idle,
    /// Playing, about to narrate the current record
    Armed,
    /// Playing, a narration cycle is running
    Speaking,
    /// Playing, waiting out the inter-record delay
    Delaying,
}

impl std::fmt::Display for MacroState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MacroState::Idle => write!(f, "Idle"),
            MacroState::Armed => write!(f, "Playing.Armed"),
            MacroState::Speaking => write!(f, "Playing.Speaking"),
            MacroState::Delaying => write!(f, "Playing.Delaying"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub current_index: usize,
    pub current_repeat: u32,
    pub is_playing: bool,
    pub is_speaking: bool,
    pub is_in_delay: bool,
    /// Local only; never persisted or broadcast
    pub show_editor: bool,
}

impl PlaybackState {
    pub fn at(index: usize) -> Self {
        Self {
            current_index: index,
            ..Self::default()
        }
    }

    pub fn macro_state(&self) -> MacroState {
        if !self.is_playing {
            MacroState::Idle
        } else if self.is_in_delay {
            MacroState::Delaying
        } else if self.is_speaking {
            MacroState::Speaking
        } else {
            MacroState::Armed
        }
    }

    /// Reset per-record progress
    pub fn clear_activity(&mut self) {
        self.current_repeat = 0;
        self.is_speaking = false;
        self.is_in_delay = false;
    }

    /// STOP_ALL: back to Idle without touching the position
    pub fn stop_all(&mut self) {
        self.is_playing = false;
        self.clear_activity();
    }

    /// Equal on every field that is persisted and broadcast
    pub fn same_shared_fields(&self, other: &PlaybackState) -> bool {
        self.current_index == other.current_index
            && self.current_repeat == other.current_repeat
            && self.is_playing == other.is_playing
            && self.is_speaking == other.is_speaking
            && self.is_in_delay == other.is_in_delay
    }
}

/// Thread-safe view of the orchestrator's playback state
#[derive(Clone, Default)]
pub struct SharedPlaybackState {
    inner: Arc<RwLock<PlaybackState>>,
}

impl SharedPlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a read lock on the state
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, PlaybackState> {
        self.inner.read()
    }

    /// Copy of current state (no lock held after return)
    pub fn snapshot(&self) -> PlaybackState {
        self.inner.read().clone()
    }

    pub(crate) fn replace(&self, state: PlaybackState) {
        *self.inner.write() = state;
    }

    // === Convenience read methods ===

    pub fn is_playing(&self) -> bool {
        self.inner.read().is_playing
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.read().is_speaking
    }

    pub fn is_in_delay(&self) -> bool {
        self.inner.read().is_in_delay
    }

    pub fn current_index(&self) -> usize {
        self.inner.read().current_index
    }

    pub fn current_repeat(&self) -> u32 {
        self.inner.read().current_repeat
    }

    pub fn show_editor(&self) -> bool {
        self.inner.read().show_editor
    }

    pub fn macro_state(&self) -> MacroState {
        self.inner.read().macro_state()
    }
}

/// Commands accepted by the orchestrator
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackCommand {
    /// Toggle between Idle and Playing
    PlayPause,
    /// Stop if playing; no-op when idle
    Pause,
    /// STOP_ALL regardless of state
    Stop,
    Next,
    Prev,
    GoToFirst,
    MarkCurrentLearned,
    DeleteCurrent,
    OpenEditor,
    CloseEditor,
    /// Replace the current record's fields and close the editor
    SaveEdit(RecordEdit),
    /// Position changed by outside navigation
    SetPosition(usize),
    /// Stop playback and exit the orchestrator loop
    Shutdown,
}

/// Events emitted by the orchestrator
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackEvent {
    /// State has changed (trigger UI repaint)
    StateChanged(PlaybackState),
    /// A field of a record is being narrated
    Narrating {
        index: usize,
        field: NarrationField,
        text: String,
    },
    /// A full translation/foreign/tip cycle finished
    CycleComplete { index: usize, repeat: u32 },
    /// Playback went back to Idle
    Stopped { index: usize },
    /// A failure the user should see
    Error(WordcastError),
    /// Orchestrator has shut down
    Shutdown,
}
