use std::sync::atomic::{AtomicBool, Ordering};

/// Polled once per stack iteration of either tree walker.
///
/// The host database server would wire this to its own interrupt-pending
/// flag; the checker never blocks waiting on it, it only asks.
pub trait CancellationToken {
    fn is_cancelled(&self) -> bool;
}

/// A token that never fires, for callers that have no cancellation source.
pub struct NeverCancelled;

impl CancellationToken for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A simple flag-based token, handy for tests and for embedding in a signal handler.
#[derive(Default)]
pub struct AtomicCancellationToken(AtomicBool);

impl AtomicCancellationToken {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl CancellationToken for AtomicCancellationToken {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
