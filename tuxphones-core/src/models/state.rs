use super::audio_models::{ApplicationStreamDescriptor, SinkHandle, StreamHandle};

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → routed → streaming
///   ↑       │          │
///   └───────┴──────────┘  stop_capture
/// ```
///
/// A session is reusable; there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    /// Target stream redirected onto the combined sink, no monitor yet.
    Routed,
    /// Monitor stream open and delivering frames.
    Streaming,
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Routed => "routed",
            Self::Streaming => "streaming",
        }
    }
}

/// Routing bookkeeping for the active capture.
///
/// `original_sink` is recorded before redirection and is the only source of
/// truth for restoration; it is cleared only after a successful restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSessionState {
    pub target_stream: Option<ApplicationStreamDescriptor>,
    pub original_sink: Option<SinkHandle>,
    pub capture_sink: Option<SinkHandle>,
    pub combined_sink: Option<SinkHandle>,
    pub monitor_stream: Option<StreamHandle>,
}

impl CaptureSessionState {
    pub fn new() -> Self {
        Self {
            target_stream: None,
            original_sink: None,
            capture_sink: None,
            combined_sink: None,
            monitor_stream: None,
        }
    }

    /// Derives the state machine position from what is held.
    pub fn phase(&self) -> CaptureState {
        match (&self.target_stream, &self.monitor_stream) {
            (None, _) => CaptureState::Idle,
            (Some(_), None) => CaptureState::Routed,
            (Some(_), Some(_)) => CaptureState::Streaming,
        }
    }

    pub(crate) fn clear_routing(&mut self) {
        self.target_stream = None;
        self.original_sink = None;
    }
}

impl Default for CaptureSessionState {
    fn default() -> Self {
        Self::new()
    }
}
