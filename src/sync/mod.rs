//! Cross-instance state synchronization
//!
//! Sibling orchestrator instances share a key/value store. Every committed
//! state change is written under [`PLAYBACK_STATE_KEY`]; writes notify every
//! other connected instance, which adopts the broadcast fields except
//! `current_repeat`.

pub mod message;
pub mod storage;
pub mod synchronizer;

pub use message::{apply_remote, SyncMessage};
pub use storage::{InstanceStorage, SharedStorage, StateStore, StorageChange};
pub use synchronizer::{Synchronizer, PLAYBACK_STATE_KEY};
