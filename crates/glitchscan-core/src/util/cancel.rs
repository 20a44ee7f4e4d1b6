use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Shared flag for cooperative cancellation.
///
/// Clones observe the same flag. The search controller checks it between
/// trials only; a trial in flight always finishes and gets recorded.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}
