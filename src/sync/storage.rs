//! Key/value storage shared by sibling instances
//!
//! [`SharedStorage`] is the hub; each orchestrator instance connects and gets
//! an [`InstanceStorage`]. A write through one instance notifies every other
//! connected instance but never the writer itself. Notifications go through
//! bounded channels and are dropped when a subscriber falls behind.

use crate::{Result, WordcastError};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Pending notifications per subscriber before new ones are dropped
const NOTIFY_BUFFER: usize = 64;

/// A value written by another instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
    pub value: String,
}

/// Persisted state store as seen by one instance
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Changes made by other instances
    fn subscribe(&self) -> Receiver<StorageChange>;
}

type InstanceId = u64;

#[derive(Default)]
struct StorageInner {
    values: HashMap<String, String>,
    subscribers: Vec<(InstanceId, Sender<StorageChange>)>,
    next_instance: InstanceId,
    file: Option<PathBuf>,
}

impl StorageInner {
    fn persist(&self) -> Result<()> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.values)?;
        std::fs::write(path, json)
            .map_err(|e| WordcastError::Storage(format!("{}: {}", path.display(), e)))
    }

    fn notify_others(&mut self, writer: InstanceId, key: &str, value: &str) {
        self.subscribers.retain(|(instance, tx)| {
            if *instance == writer {
                return true;
            }
            match tx.try_send(StorageChange {
                key: key.to_string(),
                value: value.to_string(),
            }) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!("Instance {} is not draining storage changes", instance);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }
}

/// Storage hub shared by all instances in the process
#[derive(Clone, Default)]
pub struct SharedStorage {
    inner: Arc<Mutex<StorageInner>>,
}

impl SharedStorage {
    /// In-memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage mirrored to a JSON file, loaded if it already exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let json = std::fs::read_to_string(&path)?;
            serde_json::from_str(&json)?
        } else {
            HashMap::new()
        };
        debug!("Opened state storage at {}", path.display());

        Ok(Self {
            inner: Arc::new(Mutex::new(StorageInner {
                values,
                file: Some(path),
                ..StorageInner::default()
            })),
        })
    }

    /// Handle for a new instance
    pub fn connect(&self) -> InstanceStorage {
        let mut inner = self.inner.lock();
        let instance = inner.next_instance;
        inner.next_instance += 1;
        InstanceStorage {
            hub: self.clone(),
            instance,
        }
    }
}

/// One instance's view of [`SharedStorage`]
#[derive(Clone)]
pub struct InstanceStorage {
    hub: SharedStorage,
    instance: InstanceId,
}

impl StateStore for InstanceStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.hub.inner.lock().values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.hub.inner.lock();
        inner.values.insert(key.to_string(), value.to_string());
        inner.notify_others(self.instance, key, value);
        inner.persist()
    }

    fn subscribe(&self) -> Receiver<StorageChange> {
        let (tx, rx) = bounded(NOTIFY_BUFFER);
        self.hub.inner.lock().subscribers.push((self.instance, tx));
        rx
    }
}
