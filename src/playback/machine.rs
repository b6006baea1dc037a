//! Transition table for playback
//!
//! [`transition`] is pure: it maps the current state and an action to the next
//! state plus a list of [`Effect`]s. Timers, the narration driver and session
//! tokens are touched only by the controller when it applies those effects.

use super::config::EndOfList;
use super::state::PlaybackState;
use crate::sync::{apply_remote, SyncMessage};

/// Facts about the active list the table needs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListContext {
    pub len: usize,
    pub repeat_count: u32,
    pub end_of_list: EndOfList,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackAction {
    /// RESUME
    Resume,
    /// PAUSE; no-op when idle
    Pause,
    /// STOP_ALL
    Stop,
    /// ADVANCE
    Advance,
    /// RETREAT
    Retreat,
    /// JUMP_FIRST
    JumpFirst,
    /// The current record left the active list (learned or deleted);
    /// the context already carries the new length
    RecordRemoved,
    /// EXTERNAL_POSITION_CHANGE
    ExternalPosition(usize),
    /// The sequencer began a cycle
    CycleStarted,
    /// SEQUENCE_STEP_COMPLETE
    SequenceStepComplete,
    /// The inter-record delay ran out
    DelayElapsed,
    /// Narration failed for a reason other than cancellation
    NarrationFailed,
    /// The running cycle was abandoned without a result
    NarrationLost,
    /// The active list changed underneath us
    ListChanged,
    /// State broadcast by a sibling instance
    RemoteUpdate(SyncMessage),
    OpenEditor,
    CloseEditor,
}

/// Side effects requested by a transition, applied in order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Invalidate the current token, force-stop narration, clear the delay timer
    CancelSession,
    /// Allocate a fresh session token
    BeginSession,
    /// Run the sequencer for the current record
    Narrate,
    /// Arm the inter-record delay timer
    StartDelay,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: PlaybackState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(state: &PlaybackState) -> Self {
        Self {
            state: state.clone(),
            effects: Vec::new(),
        }
    }

    fn to(state: PlaybackState, effects: Vec<Effect>) -> Self {
        Self { state, effects }
    }
}

/// Index after `index`, or `None` when the list ends and the policy halts
pub fn next_index(index: usize, len: usize, policy: EndOfList) -> Option<usize> {
    if len == 0 {
        return None;
    }
    if index + 1 < len {
        return Some(index + 1);
    }
    match policy {
        EndOfList::Wrap => Some(0),
        EndOfList::Halt => None,
    }
}

/// Index before `index`; always wraps from the first record to the last
pub fn prev_index(index: usize, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    if index == 0 || index >= len {
        Some(len - 1)
    } else {
        Some(index - 1)
    }
}

/// Keep narrating after a reposition if we were playing
fn restart_if_playing(state: &PlaybackState, mut effects: Vec<Effect>) -> Vec<Effect> {
    if state.is_playing {
        effects.push(Effect::BeginSession);
        effects.push(Effect::Narrate);
    }
    effects
}

pub fn transition(state: &PlaybackState, action: &PlaybackAction, ctx: &ListContext) -> Transition {
    let mut next = state.clone();

    match action {
        PlaybackAction::Resume => {
            if state.is_playing || ctx.len == 0 {
                return Transition::unchanged(state);
            }
            next.is_playing = true;
            next.is_speaking = false;
            next.is_in_delay = false;
            if next.current_index >= ctx.len {
                next.current_index = ctx.len - 1;
                next.current_repeat = 0;
            }
            Transition::to(
                next,
                vec![Effect::CancelSession, Effect::BeginSession, Effect::Narrate],
            )
        }

        PlaybackAction::Pause => {
            if !state.is_playing {
                return Transition::unchanged(state);
            }
            next.stop_all();
            Transition::to(next, vec![Effect::CancelSession])
        }

        PlaybackAction::Stop => {
            next.stop_all();
            Transition::to(next, vec![Effect::CancelSession])
        }

        PlaybackAction::Advance => {
            next.clear_activity();
            match next_index(state.current_index, ctx.len, ctx.end_of_list) {
                Some(index) => next.current_index = index,
                None if ctx.len == 0 => {
                    next.current_index = 0;
                    next.is_playing = false;
                }
                None => {
                    next.current_index = ctx.len - 1;
                    next.is_playing = false;
                }
            }
            let effects = restart_if_playing(&next, vec![Effect::CancelSession]);
            Transition::to(next, effects)
        }

        PlaybackAction::Retreat => {
            next.clear_activity();
            match prev_index(state.current_index, ctx.len) {
                Some(index) => next.current_index = index,
                None => {
                    next.current_index = 0;
                    next.is_playing = false;
                }
            }
            let effects = restart_if_playing(&next, vec![Effect::CancelSession]);
            Transition::to(next, effects)
        }

        PlaybackAction::JumpFirst => {
            next.clear_activity();
            next.current_index = 0;
            if ctx.len == 0 {
                next.is_playing = false;
            }
            let effects = restart_if_playing(&next, vec![Effect::CancelSession]);
            Transition::to(next, effects)
        }

        PlaybackAction::RecordRemoved => {
            next.clear_activity();
            if ctx.len == 0 {
                next.is_playing = false;
                next.current_index = 0;
            } else if next.current_index >= ctx.len {
                next.current_index = ctx.len - 1;
            }
            let effects = restart_if_playing(&next, vec![Effect::CancelSession]);
            Transition::to(next, effects)
        }

        PlaybackAction::ExternalPosition(index) => {
            let index = *index;
            if index == state.current_index || index >= ctx.len {
                return Transition::unchanged(state);
            }
            next.current_index = index;
            next.clear_activity();
            Transition::to(next, Vec::new())
        }

        PlaybackAction::CycleStarted => {
            if !state.is_playing {
                return Transition::unchanged(state);
            }
            next.is_speaking = true;
            next.is_in_delay = false;
            Transition::to(next, Vec::new())
        }

        PlaybackAction::SequenceStepComplete => {
            if !state.is_playing {
                return Transition::unchanged(state);
            }
            next.is_speaking = false;
            if state.current_repeat + 1 < ctx.repeat_count {
                next.current_repeat += 1;
                Transition::to(next, vec![Effect::Narrate])
            } else {
                next.current_repeat = 0;
                next.is_in_delay = true;
                Transition::to(next, vec![Effect::StartDelay])
            }
        }

        PlaybackAction::DelayElapsed => {
            if !state.is_in_delay {
                return Transition::unchanged(state);
            }
            next.is_in_delay = false;
            if !state.is_playing {
                return Transition::to(next, Vec::new());
            }
            match next_index(state.current_index, ctx.len, ctx.end_of_list) {
                Some(index) => {
                    next.current_index = index;
                    next.current_repeat = 0;
                    Transition::to(next, vec![Effect::Narrate])
                }
                None => {
                    next.stop_all();
                    if ctx.len == 0 {
                        next.current_index = 0;
                    }
                    Transition::to(next, Vec::new())
                }
            }
        }

        PlaybackAction::NarrationFailed => {
            next.stop_all();
            Transition::to(next, vec![Effect::CancelSession])
        }

        PlaybackAction::NarrationLost => {
            next.is_speaking = false;
            Transition::to(next, Vec::new())
        }

        PlaybackAction::ListChanged => {
            if ctx.len == 0 {
                if state.current_index == 0 && !state.is_playing {
                    return Transition::unchanged(state);
                }
                next.stop_all();
                next.current_index = 0;
                return Transition::to(next, vec![Effect::CancelSession]);
            }
            if state.current_index < ctx.len {
                return Transition::unchanged(state);
            }
            next.current_index = ctx.len - 1;
            next.clear_activity();
            let effects = restart_if_playing(&next, vec![Effect::CancelSession]);
            Transition::to(next, effects)
        }

        PlaybackAction::RemoteUpdate(message) => {
            let adopted = apply_remote(state, message, ctx.len);
            let effects = match (state.is_playing, adopted.is_playing) {
                (true, false) => vec![Effect::CancelSession],
                (false, true) => vec![Effect::BeginSession],
                (true, true) if adopted.current_index != state.current_index => {
                    vec![Effect::CancelSession, Effect::BeginSession]
                }
                _ => Vec::new(),
            };
            Transition::to(adopted, effects)
        }

        PlaybackAction::OpenEditor => {
            next.show_editor = true;
            if state.is_playing {
                next.stop_all();
                return Transition::to(next, vec![Effect::CancelSession]);
            }
            Transition::to(next, Vec::new())
        }

        PlaybackAction::CloseEditor => {
            next.show_editor = false;
            Transition::to(next, Vec::new())
        }
    }
}
