use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Position shared with outside navigation
///
/// The orchestrator reads it at startup and writes it after every
/// index-changing transition; navigation writes it and then sends
/// `SetPosition` so the orchestrator adopts the new index.
#[derive(Clone, Debug, Default)]
pub struct PositionCursor {
    index: Arc<AtomicUsize>,
}

impl PositionCursor {
    pub fn new(index: usize) -> Self {
        Self {
            index: Arc::new(AtomicUsize::new(index)),
        }
    }

    pub fn get(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    pub fn set(&self, index: usize) {
        self.index.store(index, Ordering::SeqCst);
    }
}
