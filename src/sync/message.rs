use crate::playback::PlaybackState;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Wire schema for broadcast playback state
///
/// `show_editor` is never part of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    pub current_index: usize,
    pub current_repeat: u32,
    pub is_playing: bool,
    pub is_speaking: bool,
    pub is_in_delay: bool,
}

impl SyncMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<&PlaybackState> for SyncMessage {
    fn from(state: &PlaybackState) -> Self {
        Self {
            current_index: state.current_index,
            current_repeat: state.current_repeat,
            is_playing: state.is_playing,
            is_speaking: state.is_speaking,
            is_in_delay: state.is_in_delay,
        }
    }
}

/// Adopt a sibling's broadcast into local state
///
/// `current_repeat` and `show_editor` stay local so an in-flight cycle keeps
/// its own repeat progress. The remote index is clamped to the local list.
pub fn apply_remote(local: &PlaybackState, message: &SyncMessage, len: usize) -> PlaybackState {
    let mut adopted = local.clone();
    adopted.current_index = if len == 0 {
        0
    } else {
        message.current_index.min(len - 1)
    };
    adopted.is_playing = message.is_playing && len > 0;
    adopted.is_speaking = adopted.is_playing && message.is_speaking;
    adopted.is_in_delay = adopted.is_playing && message.is_in_delay && !adopted.is_speaking;
    if !adopted.is_playing {
        adopted.current_repeat = 0;
    }
    adopted
}
