use crate::models::error::CaptureError;
use crate::models::state::CaptureState;
use crate::models::stats::FrameDropReason;

/// Observer for capture session notifications.
///
/// `on_state_changed` and `on_error` run on the thread that drove the
/// transition. `on_frame_dropped` runs on the audio server's event-loop
/// thread and must return quickly.
pub trait CaptureDelegate: Send + Sync {
    fn on_state_changed(&self, state: CaptureState);

    /// A frame was discarded without reaching the consumer.
    fn on_frame_dropped(&self, reason: &FrameDropReason);

    /// A failure surfaced during a session transition or cleanup.
    fn on_error(&self, error: &CaptureError);
}
