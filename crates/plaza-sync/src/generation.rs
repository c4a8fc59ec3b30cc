use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter identifying the currently displayed target of a view
/// (the open post, the open chatroom, the latest search). A response that was
/// requested under an older token is discarded on arrival.
#[derive(Debug, Default)]
pub struct ViewGeneration(AtomicU64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewToken(u64);

impl ViewGeneration {
    pub fn current(&self) -> ViewToken {
        ViewToken(self.0.load(Ordering::Acquire))
    }

    /// Invalidates every outstanding token.
    pub fn advance(&self) -> ViewToken {
        ViewToken(self.0.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, token: ViewToken) -> bool {
        self.current() == token
    }
}
