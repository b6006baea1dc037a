//! Playback state, transitions and the engine that drives narration

mod config;
mod controller;
mod cursor;
mod machine;
mod sequencer;
mod session;
mod state;
mod watchdog;

pub use config::{EndOfList, PlaybackConfig};
pub use controller::PlaybackController;
pub use cursor::PositionCursor;
pub use machine::{
    next_index, prev_index, transition, Effect, ListContext, PlaybackAction, Transition,
};
pub use sequencer::{CycleSnapshot, NarrationField, Sequencer, SequencerStep};
pub use session::SessionToken;
pub use state::{MacroState, PlaybackCommand, PlaybackEvent, PlaybackState, SharedPlaybackState};
pub use watchdog::{Watchdog, WatchdogConfig, WatchdogProbe};
