use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared flag a caller can trip to abandon a pending server round trip.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Bound on how long a blocking server call may wait.
///
/// `Deadline::unbounded()` reproduces the wait-forever behavior.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl Deadline {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }

    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Fixes the deadline to an instant, measured from now.
    pub fn start(&self) -> Option<Instant> {
        self.timeout.map(|t| Instant::now() + t)
    }
}
