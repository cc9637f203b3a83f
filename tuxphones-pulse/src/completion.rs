use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Result slot filled by a mainloop callback and awaited by a caller thread.
///
/// Callbacks must never block on the caller, so the caller waits here
/// without holding the mainloop lock.
pub(crate) struct Completion<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Completion<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        })
    }

    /// Store `value`, replacing anything not yet taken, and wake waiters.
    pub(crate) fn complete(&self, value: T) {
        *self.slot.lock() = Some(value);
        self.ready.notify_all();
    }

    pub(crate) fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    /// Block up to `timeout` for a value.
    pub(crate) fn wait_for(&self, timeout: Duration) -> Option<T> {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            self.ready.wait_for(&mut slot, timeout);
        }
        slot.take()
    }
}
