use std::sync::Arc;

use crate::models::audio_models::{
    ModuleHandle, MonitorStreamSpec, RawStreamInfo, SinkDescriptor, SinkHandle, StreamHandle,
};
use crate::models::deadline::Deadline;
use crate::models::error::ConnectionError;

/// Callback invoked with each buffer read from a monitor stream.
///
/// Samples are mono signed 16-bit. The callback fires on the audio server's
/// event-loop thread; keep processing minimal.
pub type FrameCallback = Arc<dyn Fn(&[i16]) + Send + Sync + 'static>;

/// One request in the audio server's operation protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerRequest {
    /// Server-wide information, used to resolve the default sink.
    ServerInfo,
    ListSinks,
    /// Playback streams currently attached to sinks.
    ListStreams,
    LoadModule { name: String, argument: String },
    UnloadModule(ModuleHandle),
    MoveStream { stream: StreamHandle, sink: SinkHandle },
}

impl ServerRequest {
    pub fn describe(&self) -> String {
        match self {
            Self::ServerInfo => "get server info".into(),
            Self::ListSinks => "list sinks".into(),
            Self::ListStreams => "list streams".into(),
            Self::LoadModule { name, argument } => format!("load {} ({})", name, argument),
            Self::UnloadModule(module) => format!("unload {}", module),
            Self::MoveStream { stream, sink } => format!("move {} to {}", stream, sink),
        }
    }
}

/// Result of a completed server operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    ServerInfo { default_sink: Option<String> },
    Sinks(Vec<SinkDescriptor>),
    Streams(Vec<RawStreamInfo>),
    ModuleLoaded(ModuleHandle),
    /// A request with no payload (unload, move) succeeded.
    Completed,
}

impl OperationOutcome {
    pub fn into_default_sink(self) -> Result<Option<String>, ConnectionError> {
        match self {
            Self::ServerInfo { default_sink } => Ok(default_sink),
            other => Err(other.unexpected("server info")),
        }
    }

    pub fn into_sinks(self) -> Result<Vec<SinkDescriptor>, ConnectionError> {
        match self {
            Self::Sinks(sinks) => Ok(sinks),
            other => Err(other.unexpected("sink list")),
        }
    }

    pub fn into_streams(self) -> Result<Vec<RawStreamInfo>, ConnectionError> {
        match self {
            Self::Streams(streams) => Ok(streams),
            other => Err(other.unexpected("stream list")),
        }
    }

    pub fn into_module(self) -> Result<ModuleHandle, ConnectionError> {
        match self {
            Self::ModuleLoaded(module) => Ok(module),
            other => Err(other.unexpected("module index")),
        }
    }

    pub fn into_completed(self) -> Result<(), ConnectionError> {
        match self {
            Self::Completed => Ok(()),
            other => Err(other.unexpected("completion")),
        }
    }

    fn unexpected(&self, wanted: &str) -> ConnectionError {
        ConnectionError::OperationFailed(format!("expected {}, server returned {:?}", wanted, self))
    }
}

/// An open record stream attached to a sink monitor.
///
/// Owned by exactly one capture session. Dropping an unclosed stream closes it.
pub trait MonitorStream: Send {
    fn handle(&self) -> StreamHandle;

    /// Disconnect the stream. No frame callback runs after this returns.
    fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Connection to the audio server.
///
/// Implemented by:
/// - `PulseConnection` (tuxphones-pulse)
///
/// Implementations run the server's event loop on one background thread and
/// collapse its asynchronous operation protocol into blocking calls. Round
/// trips are serialized: concurrent callers wait their turn.
pub trait AudioServer: Send + Sync {
    /// Start the event loop and block until the session is ready or failed.
    fn connect(&self, deadline: &Deadline) -> Result<(), ConnectionError>;

    /// Release the session and stop the event loop. Idempotent.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Issue one request and block until the server reports completion.
    fn submit_and_wait(
        &self,
        request: ServerRequest,
        deadline: &Deadline,
    ) -> Result<OperationOutcome, ConnectionError>;

    /// Open a record stream on `spec.source` and block until it is ready.
    ///
    /// `on_frame` fires on the event-loop thread for every buffer read.
    fn open_monitor_stream(
        &self,
        spec: &MonitorStreamSpec,
        on_frame: FrameCallback,
        deadline: &Deadline,
    ) -> Result<Box<dyn MonitorStream>, ConnectionError>;
}
