use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Identity of one play session
///
/// A fresh token is allocated on every resume, skip and removal; the previous
/// one is cancelled first. Continuations hold a clone and must check
/// [`SessionToken::is_current`] before touching shared state.
#[derive(Clone, Debug)]
pub struct SessionToken {
    id: Uuid,
    cancelled: Arc<AtomicBool>,
}

impl SessionToken {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A token that was never live
    pub fn cancelled() -> Self {
        let token = Self::new();
        token.cancel();
        token
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Same session as `current` and still live
    pub fn is_current(&self, current: &SessionToken) -> bool {
        self.id == current.id && !self.is_cancelled()
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = SessionToken::new();
        let held = token.clone();
        assert!(held.is_current(&token));

        token.cancel();
        assert!(held.is_cancelled());
        assert!(!held.is_current(&token));
    }

    #[test]
    fn test_other_session_is_not_current() {
        let old = SessionToken::new();
        let new = SessionToken::new();
        assert!(!old.is_current(&new));
        assert!(SessionToken::cancelled().is_cancelled());
    }
}
