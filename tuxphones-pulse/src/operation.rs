//! Blocking wait over one pending server operation.

use std::time::{Duration, Instant};

use tuxphones_core::models::deadline::Deadline;
use tuxphones_core::models::error::ConnectionError;
use tuxphones_core::traits::audio_server::ServerRequest;

use crate::completion::Completion;

/// How often a waiting caller rechecks the operation and its deadline.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OperationState {
    Running,
    Done,
    /// Cancelled by us or by the server, e.g. because the context died.
    Cancelled,
}

/// An in-flight server operation. Only touched with the mainloop lock held.
pub(crate) trait PendingOperation {
    fn state(&self) -> OperationState;
    fn cancel(&mut self);
}

#[cfg(target_os = "linux")]
impl<C: ?Sized> PendingOperation for pulse::operation::Operation<C> {
    fn state(&self) -> OperationState {
        match self.get_state() {
            pulse::operation::State::Running => OperationState::Running,
            pulse::operation::State::Done => OperationState::Done,
            pulse::operation::State::Cancelled => OperationState::Cancelled,
        }
    }

    fn cancel(&mut self) {
        pulse::operation::Operation::cancel(self);
    }
}

/// Wait for `done` to be filled by the operation's callback.
///
/// Between waits the operation is inspected under `lock`. An expired
/// deadline or a tripped token cancels the operation before returning.
pub(crate) fn await_operation<T, O, G>(
    op: &mut O,
    done: &Completion<T>,
    deadline: &Deadline,
    lock: impl Fn() -> G,
) -> Result<T, ConnectionError>
where
    O: PendingOperation + ?Sized,
{
    let expires = deadline.start();
    loop {
        if let Some(value) = done.wait_for(POLL_INTERVAL) {
            return Ok(value);
        }

        let _guard = lock();
        if let Some(value) = done.take() {
            return Ok(value);
        }
        match op.state() {
            OperationState::Running => {}
            OperationState::Cancelled => return Err(ConnectionError::Cancelled),
            OperationState::Done => {
                return Err(ConnectionError::OperationFailed(
                    "operation finished without a result".into(),
                ))
            }
        }
        if deadline.is_cancelled() {
            op.cancel();
            return Err(ConnectionError::Cancelled);
        }
        if let (Some(expires), Some(timeout)) = (expires, deadline.timeout) {
            if Instant::now() >= expires {
                op.cancel();
                return Err(ConnectionError::Timeout(timeout));
            }
        }
    }
}

/// Error for a request the server answered with failure.
pub(crate) fn request_failure(request: &ServerRequest, entity_gone: bool, detail: &str) -> ConnectionError {
    if entity_gone {
        ConnectionError::EntityGone(request.describe())
    } else {
        ConnectionError::OperationFailed(format!("{}: {}", request.describe(), detail))
    }
}
