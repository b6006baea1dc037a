use super::message::SyncMessage;
use super::storage::{StateStore, StorageChange};
use crate::playback::PlaybackState;
use crate::Result;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage key for broadcast playback state
pub const PLAYBACK_STATE_KEY: &str = "playbackState";

/// Publishes local state and decodes sibling broadcasts
pub struct Synchronizer {
    store: Arc<dyn StateStore>,
    changes: Receiver<StorageChange>,
}

impl Synchronizer {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        let changes = store.subscribe();
        Self { store, changes }
    }

    /// Notifications from other instances
    pub fn changes(&self) -> Receiver<StorageChange> {
        self.changes.clone()
    }

    /// Last persisted state, if any and if readable
    pub fn load(&self) -> Option<SyncMessage> {
        let json = match self.store.get(PLAYBACK_STATE_KEY) {
            Ok(json) => json?,
            Err(e) => {
                warn!("Failed to read persisted playback state: {}", e);
                return None;
            }
        };
        match SyncMessage::from_json(&json) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Ignoring malformed persisted playback state: {}", e);
                None
            }
        }
    }

    pub fn publish(&self, state: &PlaybackState) -> Result<()> {
        let json = SyncMessage::from(state).to_json()?;
        debug!("Publishing playback state {}", json);
        self.store.set(PLAYBACK_STATE_KEY, &json)
    }

    /// Decode a change notification; other keys and bad payloads yield `None`
    pub fn decode(&self, change: &StorageChange) -> Option<SyncMessage> {
        if change.key != PLAYBACK_STATE_KEY {
            return None;
        }
        match SyncMessage::from_json(&change.value) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!("Ignoring malformed playback broadcast: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::storage::SharedStorage;

    #[test]
    fn test_publish_reaches_sibling() {
        let hub = SharedStorage::new();
        let a = Synchronizer::new(Arc::new(hub.connect()));
        let b = Synchronizer::new(Arc::new(hub.connect()));

        let state = PlaybackState {
            current_repeat: 1,
            is_playing: true,
            ..PlaybackState::at(3)
        };
        a.publish(&state).unwrap();

        assert!(a.changes().try_recv().is_err());
        let change = b.changes().try_recv().unwrap();
        let message = b.decode(&change).unwrap();
        assert_eq!(message.current_index, 3);
        assert_eq!(message.current_repeat, 1);
        assert_eq!(b.load(), Some(message));
    }

    #[test]
    fn test_decode_ignores_other_keys_and_garbage() {
        let hub = SharedStorage::new();
        let sync = Synchronizer::new(Arc::new(hub.connect()));

        let other = StorageChange {
            key: "wordList".into(),
            value: "[]".into(),
        };
        assert!(sync.decode(&other).is_none());

        let garbage = StorageChange {
            key: PLAYBACK_STATE_KEY.into(),
            value: "{".into(),
        };
        assert!(sync.decode(&garbage).is_none());
    }

    #[test]
    fn test_load_malformed_is_none() {
        let hub = SharedStorage::new();
        let store = hub.connect();
        store.set(PLAYBACK_STATE_KEY, "nope").unwrap();
        assert!(Synchronizer::new(Arc::new(store)).load().is_none());
    }
}
